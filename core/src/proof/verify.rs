use alloc::vec::Vec;

use crate::cbor::DecodeError;
use crate::hasher::CommitmentScheme;
use crate::nibble::{nibble_at, NibblePath, MAX_NIBBLES};
use crate::node::{Hash, InternalNode, KeyHash, LeafNode, Node, ValueHash};

/// Errors raised while verifying a proof.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// The wire could not be decoded.
    #[error("malformed proof: {0}")]
    Decode(#[from] DecodeError),
    /// A record follows a terminal record.
    #[error("record {0} follows the terminal record")]
    TrailingRecords(usize),
    /// More internal records than there are nibbles in a key.
    #[error("proof has more than 64 steps")]
    TooManySteps,
    /// The last internal record points to a child but no record follows it.
    #[error("proof ends before reaching a terminal")]
    Incomplete,
    /// A recomputed hash does not match the hash committed above it.
    #[error("hash mismatch at depth {0}")]
    HashMismatch(usize),
    /// The recomputed root does not match the expected root.
    #[error("root mismatch")]
    RootMismatch,
    /// An in-memory proof disagrees with itself or with the key it is verified for.
    #[error("proof is internally inconsistent")]
    Inconsistent,
}

impl ProofError {
    /// Whether the proof was well-formed but simply does not prove anything against the
    /// expected root.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            ProofError::Incomplete | ProofError::HashMismatch(_) | ProofError::RootMismatch
        )
    }
}

/// A proof whose path has been checked against a root.
///
/// A verified proof can be used to check one of two statements:
///   1. That the key has a specific value.
///   2. That the key is absent.
///
/// Statement (1) holds when the path ends in a leaf for the key with the provided value hash.
/// Statement (2) holds when the path ends in an empty slot, or in a leaf for a different key
/// which shares the traversed prefix.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    key_hash: KeyHash,
    depth: usize,
    terminal: Option<LeafNode>,
}

impl VerifiedProof {
    /// The number of internal nodes traversed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn terminal(&self) -> Option<&LeafNode> {
        self.terminal.as_ref()
    }

    /// Check that the key maps to a value with the given hash.
    pub fn confirm_value(&self, value_hash: &ValueHash) -> bool {
        self.terminal
            .as_ref()
            .map_or(false, |leaf| {
                leaf.key_hash == self.key_hash && leaf.value_hash == *value_hash
            })
    }

    /// Check that the key has no value.
    pub fn confirm_nonexistence(&self) -> bool {
        match &self.terminal {
            None => true,
            Some(leaf) => {
                leaf.key_hash != self.key_hash
                    && NibblePath::from_key_hash_prefix(&leaf.key_hash, self.depth)
                        == NibblePath::from_key_hash_prefix(&self.key_hash, self.depth)
            }
        }
    }
}

/// Verify a sequence of node records, root first, against an expected root.
///
/// The internal records are followed along the nibbles of `key_hash`. An internal record whose
/// slot for the key is empty ends the path, as does a leaf record; anything after that is
/// rejected. The hashes are then recomputed bottom-up, and every internal record must commit to
/// the hash computed for the record below it. No records at all stand for the empty tree.
pub fn verify_records<C: CommitmentScheme>(
    records: &[Node],
    key_hash: &KeyHash,
    expected_root: &Hash,
) -> Result<VerifiedProof, ProofError> {
    let mut internals: Vec<&InternalNode> = Vec::new();
    let mut terminal = None;
    let mut ended = records.is_empty();

    for (index, record) in records.iter().enumerate() {
        if ended {
            return Err(ProofError::TrailingRecords(index));
        }
        match record {
            Node::Internal(node) => {
                let depth = internals.len();
                if depth >= MAX_NIBBLES {
                    return Err(ProofError::TooManySteps);
                }
                ended = node.child(nibble_at(key_hash, depth)).is_none();
                internals.push(node);
            }
            Node::Leaf(leaf) => {
                terminal = Some(*leaf);
                ended = true;
            }
        }
    }
    if !ended {
        return Err(ProofError::Incomplete);
    }

    let depth = internals.len();
    let mut current = terminal.map(|leaf| leaf.hash::<C>(depth));
    for (d, node) in internals.iter().enumerate().rev() {
        if node.child(nibble_at(key_hash, d)) != current.as_ref() {
            return Err(ProofError::HashMismatch(d));
        }
        current = Some(node.hash::<C>());
    }

    if current.unwrap_or_else(C::null_hash) != *expected_root {
        return Err(ProofError::RootMismatch);
    }

    Ok(VerifiedProof {
        key_hash: *key_hash,
        depth,
        terminal,
    })
}
