//! Proofs of inclusion and non-inclusion, and their verification.
//!
//! The Jellyfish Merkle Tree is an authenticated data structure: given a root hash, any key can
//! be proven to map to a specific value, or to be absent, without trusting the storage the proof
//! was read from. This module exposes the proof types produced by the tree ([`JmtProof`],
//! [`BranchStep`]), the stateless verifier ([`verify_records`], [`VerifiedProof`]) and the CBOR
//! wire form ([`encode_wire`], [`decode_wire`], [`verify_wire`]).

use alloc::vec::Vec;

use crate::hasher::{CommitmentScheme, HashFunction};
use crate::nibble::{nibble_at, NibblePath, RADIX};
use crate::node::{Hash, InternalNode, KeyHash, LeafNode, Node, ValueHash};

pub use verify::{verify_records, ProofError, VerifiedProof};
pub use wire::{decode_wire, encode_wire, verify_wire};

mod verify;
mod wire;

/// The lone non-empty sibling of the child followed at a [`BranchStep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Neighbor {
    /// The sibling is a leaf.
    Leaf {
        key_hash: KeyHash,
        value_hash: ValueHash,
    },
    /// The sibling is the root of an internal subtree at `prefix`.
    Fork { prefix: NibblePath, root: Hash },
}

/// One internal node traversed while proving a key, in root-to-leaf order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStep {
    /// The path of the internal node. Its length is the node's depth.
    pub prefix: NibblePath,
    /// The node's full child array. Always the source of truth for verification.
    pub child_hashes: [Option<Hash>; RADIX],
    /// The nibble followed towards the proven key.
    pub child_index: u8,
    /// Whether exactly one other child exists besides the followed one.
    pub single_neighbor: bool,
    /// The nibble of that lone sibling, if `single_neighbor`.
    pub neighbor_nibble: Option<u8>,
    /// What the lone sibling resolved to, if it was looked up.
    pub neighbor: Option<Neighbor>,
}

impl BranchStep {
    /// Build a step for an internal node, without neighbor information.
    pub fn new(prefix: NibblePath, node: &InternalNode, child_index: u8) -> Self {
        let child_hashes = node.expand();
        let mut siblings = child_hashes
            .iter()
            .enumerate()
            .filter(|(i, slot)| *i != child_index as usize && slot.is_some())
            .map(|(i, _)| i as u8);
        let first = siblings.next();
        let single = first.is_some() && siblings.next().is_none();

        BranchStep {
            prefix,
            child_hashes,
            child_index,
            single_neighbor: single,
            neighbor_nibble: if single { first } else { None },
            neighbor: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.prefix.len()
    }

    /// The child hash on the proven path, if present.
    pub fn child(&self) -> Option<&Hash> {
        self.child_hashes
            .get(self.child_index as usize)
            .and_then(|c| c.as_ref())
    }

    /// The internal node record this step stands for.
    pub fn to_node(&self) -> InternalNode {
        InternalNode::from_slots(&self.child_hashes)
    }

    /// Check the neighbor shortcut fields against the full child array.
    pub fn neighbor_consistent<C: CommitmentScheme>(&self) -> bool {
        let others = self
            .child_hashes
            .iter()
            .enumerate()
            .filter(|(i, slot)| *i != self.child_index as usize && slot.is_some())
            .count();
        if self.single_neighbor != (others == 1) {
            return false;
        }

        let nibble = match (self.single_neighbor, self.neighbor_nibble) {
            (false, None) => return self.neighbor.is_none(),
            (true, Some(n)) if (n as usize) < RADIX => n,
            _ => return false,
        };
        let Some(slot) = self.child_hashes[nibble as usize] else {
            return false;
        };

        match &self.neighbor {
            None => true,
            Some(Neighbor::Leaf {
                key_hash,
                value_hash,
            }) => LeafNode::new(*key_hash, *value_hash).hash::<C>(self.depth() + 1) == slot,
            Some(Neighbor::Fork { prefix, root }) => {
                prefix.len() == self.depth() + 1
                    && prefix.starts_with(&self.prefix)
                    && prefix.get(self.depth()) == Some(nibble)
                    && *root == slot
            }
        }
    }
}

/// A proof that a key is present with some value, or absent, at a particular root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JmtProof {
    /// The key is present.
    Inclusion {
        steps: Vec<BranchStep>,
        value: Vec<u8>,
        value_hash: ValueHash,
        /// The key hash nibbles below the leaf's position.
        suffix: NibblePath,
        leaf_key_hash: KeyHash,
    },
    /// The path of the key ends at an empty slot, or the tree is empty.
    NonInclusionEmpty { steps: Vec<BranchStep> },
    /// The path of the key ends at a leaf for another key.
    NonInclusionDifferentLeaf {
        steps: Vec<BranchStep>,
        conflicting_key_hash: KeyHash,
        conflicting_value_hash: ValueHash,
        conflicting_suffix: NibblePath,
    },
}

impl JmtProof {
    pub fn steps(&self) -> &[BranchStep] {
        match self {
            JmtProof::Inclusion { steps, .. }
            | JmtProof::NonInclusionEmpty { steps }
            | JmtProof::NonInclusionDifferentLeaf { steps, .. } => steps,
        }
    }

    pub fn is_inclusion(&self) -> bool {
        matches!(self, JmtProof::Inclusion { .. })
    }

    /// The proven value, for inclusion proofs.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            JmtProof::Inclusion { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The terminal leaf of the proof, if any.
    pub fn leaf(&self) -> Option<LeafNode> {
        match self {
            JmtProof::Inclusion {
                leaf_key_hash,
                value_hash,
                ..
            } => Some(LeafNode::new(*leaf_key_hash, *value_hash)),
            JmtProof::NonInclusionDifferentLeaf {
                conflicting_key_hash,
                conflicting_value_hash,
                ..
            } => Some(LeafNode::new(*conflicting_key_hash, *conflicting_value_hash)),
            JmtProof::NonInclusionEmpty { .. } => None,
        }
    }

    /// The node records making up this proof: one internal record per step, followed by the
    /// terminal leaf if there is one.
    pub fn to_records(&self) -> Vec<Node> {
        let mut records: Vec<Node> = self
            .steps()
            .iter()
            .map(|step| Node::Internal(step.to_node()))
            .collect();
        records.extend(self.leaf().map(Node::Leaf));
        records
    }

    /// Encode this proof in its CBOR wire form.
    pub fn to_wire(&self) -> Vec<u8> {
        encode_wire(&self.to_records())
    }

    /// Verify this proof against a root for the given key hash.
    ///
    /// On top of recomputing the root, this checks that the proof is internally consistent: the
    /// steps follow the key's nibbles, the neighbor shortcuts agree with the child arrays, the
    /// suffixes match the leaf depth and an inclusion proof's value hashes to its value hash.
    /// The returned [`VerifiedProof`] answers what the proof shows about the key.
    pub fn verify<H: HashFunction, C: CommitmentScheme>(
        &self,
        expected_root: &Hash,
        key_hash: &KeyHash,
    ) -> Result<VerifiedProof, ProofError> {
        let steps = self.steps();
        for (depth, step) in steps.iter().enumerate() {
            if step.depth() != depth
                || NibblePath::from_key_hash_prefix(key_hash, depth) != step.prefix
                || step.child_index != nibble_at(key_hash, depth)
                || !step.neighbor_consistent::<C>()
            {
                return Err(ProofError::Inconsistent);
            }
        }

        let depth = steps.len();
        let consistent = match self {
            JmtProof::Inclusion {
                value,
                value_hash,
                suffix,
                leaf_key_hash,
                ..
            } => {
                leaf_key_hash == key_hash
                    && H::digest(value) == *value_hash
                    && LeafNode::new(*leaf_key_hash, *value_hash).suffix(depth) == *suffix
            }
            JmtProof::NonInclusionDifferentLeaf {
                conflicting_key_hash,
                conflicting_value_hash,
                conflicting_suffix,
                ..
            } => {
                conflicting_key_hash != key_hash
                    && LeafNode::new(*conflicting_key_hash, *conflicting_value_hash)
                        .suffix(depth)
                        == *conflicting_suffix
            }
            JmtProof::NonInclusionEmpty { .. } => true,
        };
        if !consistent {
            return Err(ProofError::Inconsistent);
        }

        verify_records::<C>(&self.to_records(), key_hash, expected_root)
    }
}
