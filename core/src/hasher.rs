//! Hashers (feature-gated) and the commitment schemes built on them.
//!
//! Two separate concerns live here. A [`HashFunction`] turns raw keys and values into 32-byte
//! digests. A [`CommitmentScheme`] decides how a node's logical content is laid out before being
//! hashed, and so determines the root hash of a tree.

use core::marker::PhantomData;

use crate::nibble::{NibblePath, MAX_NIBBLES, RADIX};
use crate::node::{Hash, ValueHash};

/// Domain separator for leaf commitments.
pub const LEAF_DOMAIN: u8 = 0x00;
/// Domain separator for branch commitments.
pub const BRANCH_DOMAIN: u8 = 0x01;

/// A simple trait for representing binary hash functions.
pub trait HashFunction {
    /// Hash an arbitrary-length input.
    fn digest(input: &[u8]) -> Hash;
}

/// Computes node hashes from their logical content.
///
/// The hash of the empty tree is [`CommitmentScheme::null_hash`]. Implementations must never
/// produce that value for a non-empty node.
pub trait CommitmentScheme {
    /// Commit to a leaf. `suffix` holds the nibbles of the key hash below the leaf's position.
    fn commit_leaf(suffix: &NibblePath, value_hash: &ValueHash) -> Hash;

    /// Commit to a branch given the full 16-slot child array, with `None` for absent children.
    fn commit_branch(prefix: &NibblePath, children: &[Option<Hash>; RADIX]) -> Hash;

    /// The root hash of an empty tree.
    fn null_hash() -> Hash {
        [0u8; 32]
    }
}

/// The classic commitment layout.
///
/// ```text
/// leaf   = H(0x00 || suffix_len || packed_suffix || value_hash)
/// branch = H(0x01 || bitmap_be16 || slot_0 || ... || slot_15)
/// ```
///
/// Absent branch slots are 32 zero bytes; the bitmap tells them apart from a genuine zero hash.
/// The branch prefix does not participate.
pub struct ClassicCommitment<H>(PhantomData<H>);

impl<H: HashFunction> CommitmentScheme for ClassicCommitment<H> {
    fn commit_leaf(suffix: &NibblePath, value_hash: &ValueHash) -> Hash {
        let mut buf = [0u8; 2 + MAX_NIBBLES / 2 + 32];
        buf[0] = LEAF_DOMAIN;
        buf[1] = suffix.len() as u8;
        let packed = suffix.pack();
        let mut len = 2;
        buf[len..len + packed.len()].copy_from_slice(&packed);
        len += packed.len();
        buf[len..len + 32].copy_from_slice(value_hash);
        len += 32;
        H::digest(&buf[..len])
    }

    fn commit_branch(_prefix: &NibblePath, children: &[Option<Hash>; RADIX]) -> Hash {
        let mut buf = [0u8; 3 + RADIX * 32];
        buf[0] = BRANCH_DOMAIN;
        let mut bitmap = 0u16;
        for (i, child) in children.iter().enumerate() {
            if let Some(hash) = child {
                bitmap |= 1 << i;
                let start = 3 + i * 32;
                buf[start..start + 32].copy_from_slice(hash);
            }
        }
        buf[1..3].copy_from_slice(&bitmap.to_be_bytes());
        H::digest(&buf)
    }
}

#[cfg(any(feature = "blake3-hasher", test))]
pub use self::blake3::Blake3Hasher;

/// A hash function making use of blake3.
#[cfg(any(feature = "blake3-hasher", test))]
pub mod blake3 {
    use super::HashFunction;
    use crate::node::Hash;

    /// A [`HashFunction`] implementation for Blake3.
    pub struct Blake3Hasher;

    impl HashFunction for Blake3Hasher {
        fn digest(input: &[u8]) -> Hash {
            blake3::hash(input).into()
        }
    }
}

#[cfg(feature = "sha2-hasher")]
pub use self::sha2::Sha2Hasher;

/// A hash function making use of sha2-256.
#[cfg(feature = "sha2-hasher")]
pub mod sha2 {
    use super::HashFunction;
    use crate::node::Hash;
    use sha2::{Digest, Sha256};

    /// A [`HashFunction`] implementation for Sha2.
    pub struct Sha2Hasher;

    impl HashFunction for Sha2Hasher {
        fn digest(input: &[u8]) -> Hash {
            Sha256::digest(input).into()
        }
    }
}
