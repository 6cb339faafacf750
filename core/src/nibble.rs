//! Nibble paths through the 16-ary tree.
//!
//! A key hash of 32 bytes decomposes into 64 nibbles, most-significant half of each byte first.
//! Every level of the tree consumes one nibble, so a node's position is fully described by the
//! sequence of nibbles leading to it from the root. The root lives at the empty path.
//!
//! Paths are ordered lexicographically, so a parent sorts before all of its descendants and
//! siblings sort by nibble:
//!
//! ```text
//! [] < [0] < [0, 0] < [0, 15] < [1] < [15, 15, 15]
//! ```

use alloc::vec::Vec;
use arrayvec::ArrayVec;
use core::fmt;

use crate::node::KeyHash;

/// The number of nibbles in a fully materialized path.
pub const MAX_NIBBLES: usize = 64;

/// The number of children of an internal node.
pub const RADIX: usize = 16;

/// The path of the root node.
pub const EMPTY_PATH: NibblePath = NibblePath {
    nibbles: ArrayVec::new_const(),
};

/// Extract the nibble at `index` from a key hash.
///
/// Panics if `index >= MAX_NIBBLES`.
pub fn nibble_at(key_hash: &KeyHash, index: usize) -> u8 {
    let byte = key_hash[index / 2];
    if index % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

/// An immutable sequence of at most [`MAX_NIBBLES`] values in `0..16`.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NibblePath {
    nibbles: ArrayVec<u8, MAX_NIBBLES>,
}

/// The nibbles cannot form a valid path: either a value is not in `0..16` or there are more
/// than [`MAX_NIBBLES`] of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid nibble path")]
pub struct InvalidNibblePath;

impl NibblePath {
    /// The full 64-nibble path of a key hash.
    pub fn from_key_hash(key_hash: &KeyHash) -> Self {
        let mut nibbles = ArrayVec::new();
        for i in 0..MAX_NIBBLES {
            nibbles.push(nibble_at(key_hash, i));
        }
        NibblePath { nibbles }
    }

    /// The first `len` nibbles of a key hash.
    ///
    /// Panics if `len > MAX_NIBBLES`.
    pub fn from_key_hash_prefix(key_hash: &KeyHash, len: usize) -> Self {
        assert!(len <= MAX_NIBBLES, "prefix longer than a key hash");
        let mut nibbles = ArrayVec::new();
        for i in 0..len {
            nibbles.push(nibble_at(key_hash, i));
        }
        NibblePath { nibbles }
    }

    /// Build a path out of raw nibble values.
    pub fn from_nibbles(nibbles: &[u8]) -> Result<Self, InvalidNibblePath> {
        if nibbles.len() > MAX_NIBBLES || nibbles.iter().any(|n| *n as usize >= RADIX) {
            return Err(InvalidNibblePath);
        }
        let mut path = ArrayVec::new();
        path.try_extend_from_slice(nibbles)
            .map_err(|_| InvalidNibblePath)?;
        Ok(NibblePath { nibbles: path })
    }

    /// Decode a path from its packed form, as produced by [`NibblePath::pack`].
    ///
    /// The trailing half-byte of an odd-length path must be zero.
    pub fn from_packed(packed: &[u8], len: usize) -> Result<Self, InvalidNibblePath> {
        if len > MAX_NIBBLES || packed.len() != (len + 1) / 2 {
            return Err(InvalidNibblePath);
        }
        if len % 2 == 1 && packed[packed.len() - 1] & 0x0F != 0 {
            return Err(InvalidNibblePath);
        }

        let mut nibbles = ArrayVec::new();
        for i in 0..len {
            let byte = packed[i / 2];
            nibbles.push(if i % 2 == 0 { byte >> 4 } else { byte & 0x0F });
        }
        Ok(NibblePath { nibbles })
    }

    /// The number of nibbles in the path. This is the depth of the node it addresses.
    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles.is_empty()
    }

    /// Get the nibble at the given index, if any.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.nibbles.get(index).copied()
    }

    /// Get the raw nibble values.
    pub fn as_slice(&self) -> &[u8] {
        &self.nibbles
    }

    /// Iterate the nibbles from the root downwards.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.nibbles.iter().copied()
    }

    /// The sub-path `[start, end)`.
    ///
    /// Panics if the range is out of bounds, like slice indexing.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        NibblePath {
            nibbles: self.nibbles[start..end].iter().copied().collect(),
        }
    }

    /// The first `len` nibbles.
    pub fn prefix(&self, len: usize) -> Self {
        self.slice(0, len)
    }

    /// Everything from `start` onwards.
    pub fn suffix(&self, start: usize) -> Self {
        self.slice(start, self.len())
    }

    /// The path of the child of this node at the given nibble.
    pub fn child(&self, nibble: u8) -> Result<Self, InvalidNibblePath> {
        if nibble as usize >= RADIX || self.nibbles.is_full() {
            return Err(InvalidNibblePath);
        }
        let mut nibbles = self.nibbles.clone();
        nibbles.push(nibble);
        Ok(NibblePath { nibbles })
    }

    /// The path of the parent node.
    ///
    /// The root is its own parent.
    pub fn parent(&self) -> Self {
        let mut nibbles = self.nibbles.clone();
        let _ = nibbles.pop();
        NibblePath { nibbles }
    }

    /// Append another path to this one.
    pub fn concat(&self, other: &NibblePath) -> Result<Self, InvalidNibblePath> {
        let mut nibbles = self.nibbles.clone();
        nibbles
            .try_extend_from_slice(&other.nibbles)
            .map_err(|_| InvalidNibblePath)?;
        Ok(NibblePath { nibbles })
    }

    /// The number of leading nibbles shared with another path.
    pub fn common_prefix_len(&self, other: &NibblePath) -> usize {
        self.nibbles
            .iter()
            .zip(other.nibbles.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Whether this path lies within the subtree rooted at `other`.
    pub fn starts_with(&self, other: &NibblePath) -> bool {
        self.nibbles.starts_with(&other.nibbles)
    }

    /// Pack two nibbles per byte, high half first, zero-padding an odd trailing half.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.len() + 1) / 2);
        for pair in self.nibbles.chunks(2) {
            let hi = pair[0] << 4;
            let lo = pair.get(1).copied().unwrap_or(0);
            out.push(hi | lo);
        }
        out
    }
}

impl fmt::Display for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in self.iter() {
            write!(f, "{:x}", n)?;
        }
        Ok(())
    }
}

impl fmt::Debug for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NibblePath({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use hex_literal::hex;

    const KEY: KeyHash = hex!("a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90");

    fn path(nibbles: &[u8]) -> NibblePath {
        NibblePath::from_nibbles(nibbles).unwrap()
    }

    #[test]
    fn key_hash_nibbles() {
        let full = NibblePath::from_key_hash(&KEY);
        assert_eq!(full.len(), MAX_NIBBLES);
        assert_eq!(full.prefix(4), path(&[0xa, 0x1, 0xb, 0x2]));
        assert_eq!(full.get(63), Some(0));
        assert_eq!(full.get(64), None);
        assert_eq!(NibblePath::from_key_hash_prefix(&KEY, 5), full.prefix(5));
        assert_eq!(full.pack(), KEY.to_vec());
    }

    #[test]
    fn invalid_nibbles_rejected() {
        assert_eq!(NibblePath::from_nibbles(&[16]), Err(InvalidNibblePath));
        assert_eq!(NibblePath::from_nibbles(&[0; 65]), Err(InvalidNibblePath));
        assert!(NibblePath::from_nibbles(&[15; 64]).is_ok());
    }

    #[test]
    fn child_and_parent() {
        let p = path(&[3, 4]);
        let c = p.child(9).unwrap();
        assert_eq!(c, path(&[3, 4, 9]));
        assert_eq!(c.parent(), p);
        assert_eq!(EMPTY_PATH.parent(), EMPTY_PATH);
        assert_eq!(p.child(16), Err(InvalidNibblePath));
        assert_eq!(
            NibblePath::from_key_hash(&KEY).child(0),
            Err(InvalidNibblePath)
        );
    }

    #[test]
    fn concat_and_slices() {
        let a = path(&[1, 2, 3]);
        let b = path(&[4, 5]);
        let ab = a.concat(&b).unwrap();
        assert_eq!(ab, path(&[1, 2, 3, 4, 5]));
        assert_eq!(ab.slice(1, 4), path(&[2, 3, 4]));
        assert_eq!(ab.suffix(3), b);
        assert!(ab.starts_with(&a));
        assert!(!a.starts_with(&ab));
        assert_eq!(ab.common_prefix_len(&path(&[1, 2, 9])), 2);
        assert_eq!(ab.common_prefix_len(&EMPTY_PATH), 0);
    }

    #[test]
    fn pack_odd_length() {
        let p = path(&[0xa, 0xb, 0xc]);
        assert_eq!(p.pack(), vec![0xab, 0xc0]);
        assert_eq!(NibblePath::from_packed(&p.pack(), 3).unwrap(), p);
        assert_eq!(
            NibblePath::from_packed(&[0xab, 0xcd], 3),
            Err(InvalidNibblePath)
        );
        assert_eq!(NibblePath::from_packed(&[0xab], 3), Err(InvalidNibblePath));
    }

    #[test]
    fn parent_sorts_before_descendants() {
        let left = EMPTY_PATH.child(0).unwrap();
        let right = EMPTY_PATH.child(1).unwrap();
        assert!(EMPTY_PATH < left);
        assert!(left < right);

        let mut descendant = left.clone();
        while let Ok(d) = descendant.child(15) {
            assert!(d > left);
            assert!(d < right);
            descendant = d;
        }
        assert_eq!(descendant.len(), MAX_NIBBLES);
    }

    #[test]
    fn display_as_hex() {
        assert_eq!(path(&[0, 10, 15]).to_string(), "0af");
        assert_eq!(EMPTY_PATH.to_string(), "");
    }
}
