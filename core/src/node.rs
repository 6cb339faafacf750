//! The node model of the Jellyfish Merkle Tree and its CBOR record encoding.
//!
//! Nodes come in two kinds. Leaves hold exactly one key. Internal nodes hold up to 16 child
//! hashes, one per nibble. A third tag, Extension, is reserved in the record encoding but never
//! produced; decoding one is an error.
//!
//! Records are CBOR arrays:
//!
//! ```text
//! internal: [0, bitmap, [child_hash, ...], compressed_path?]
//! leaf:     [1, key_hash, value_hash]
//! ```

use alloc::vec::Vec;

use crate::cbor::{DecodeError, Decoder, Encoder};
use crate::hasher::CommitmentScheme;
use crate::nibble::{NibblePath, EMPTY_PATH, MAX_NIBBLES, RADIX};

/// A 32-byte hash produced by a hash function or commitment scheme.
pub type Hash = [u8; 32];

/// The hash of a key. Its nibbles determine the key's position in the tree.
pub type KeyHash = [u8; 32];

/// The hash of a value.
pub type ValueHash = [u8; 32];

/// Tags identifying a node record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeTag {
    Internal = 0,
    Leaf = 1,
    /// Reserved. Never encoded and rejected when decoding.
    Extension = 2,
}

impl NodeTag {
    fn decode(tag: u64) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(NodeTag::Internal),
            1 => Ok(NodeTag::Leaf),
            2 => Ok(NodeTag::Extension),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

/// A branch node.
///
/// Child hashes are stored compactly, in ascending nibble order, with the bitmap recording which
/// nibbles are present. `popcount(bitmap) == children.len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    bitmap: u16,
    children: Vec<Hash>,
    compressed_path: Option<Vec<u8>>,
}

impl InternalNode {
    /// Create an internal node from its compact form.
    pub fn new(
        bitmap: u16,
        children: Vec<Hash>,
        compressed_path: Option<Vec<u8>>,
    ) -> Result<Self, DecodeError> {
        if bitmap == 0 {
            return Err(DecodeError::InvalidBitmap(0));
        }
        if bitmap.count_ones() as usize != children.len() {
            return Err(DecodeError::BitmapMismatch {
                bitmap,
                children: children.len(),
            });
        }
        if compressed_path
            .as_ref()
            .map_or(false, |p| p.len() * 2 > MAX_NIBBLES)
        {
            return Err(DecodeError::InvalidPath);
        }
        Ok(InternalNode {
            bitmap,
            children,
            compressed_path,
        })
    }

    /// Create an internal node from a full 16-slot child array.
    ///
    /// Returns `None` if every slot is empty.
    pub fn from_children(slots: &[Option<Hash>; RADIX]) -> Option<Self> {
        let node = Self::from_slots(slots);
        (node.bitmap != 0).then_some(node)
    }

    pub fn bitmap(&self) -> u16 {
        self.bitmap
    }

    /// The compact child hashes, in ascending nibble order.
    pub fn children(&self) -> &[Hash] {
        &self.children
    }

    pub fn compressed_path(&self) -> Option<&[u8]> {
        self.compressed_path.as_deref()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Get the hash of the child at the given nibble.
    pub fn child(&self, nibble: u8) -> Option<&Hash> {
        let bit = 1u16.checked_shl(nibble as u32)?;
        if self.bitmap & bit == 0 {
            return None;
        }
        let index = (self.bitmap & (bit - 1)).count_ones() as usize;
        self.children.get(index)
    }

    /// Iterate `(nibble, hash)` pairs of present children.
    pub fn iter_children(&self) -> impl Iterator<Item = (u8, &Hash)> + '_ {
        (0..RADIX as u8)
            .filter(move |n| self.bitmap & (1u16 << *n) != 0)
            .zip(self.children.iter())
    }

    /// Expand to the full 16-slot representation.
    pub fn expand(&self) -> [Option<Hash>; RADIX] {
        let mut slots = [None; RADIX];
        for (nibble, hash) in self.iter_children() {
            slots[nibble as usize] = Some(*hash);
        }
        slots
    }

    /// A copy of this node with the child at `nibble` set to `hash`.
    pub fn with_child(&self, nibble: u8, hash: Hash) -> Self {
        let mut slots = self.expand();
        slots[nibble as usize & 0x0F] = Some(hash);
        InternalNode {
            compressed_path: self.compressed_path.clone(),
            ..Self::from_slots(&slots)
        }
    }

    pub(crate) fn from_slots(slots: &[Option<Hash>; RADIX]) -> Self {
        let mut bitmap = 0u16;
        let mut children = Vec::with_capacity(RADIX);
        for (i, slot) in slots.iter().enumerate() {
            if let Some(hash) = slot {
                bitmap |= 1 << i;
                children.push(*hash);
            }
        }
        InternalNode {
            bitmap,
            children,
            compressed_path: None,
        }
    }

    /// The nibble path encoded by the compressed path, or the empty path.
    pub fn prefix(&self) -> NibblePath {
        self.compressed_path
            .as_ref()
            .and_then(|p| NibblePath::from_packed(p, p.len() * 2).ok())
            .unwrap_or(EMPTY_PATH)
    }

    pub fn hash<C: CommitmentScheme>(&self) -> Hash {
        C::commit_branch(&self.prefix(), &self.expand())
    }

    fn encode_into(&self, enc: &mut Encoder) {
        let arity = if self.compressed_path.is_some() { 4 } else { 3 };
        enc.array(arity)
            .uint(NodeTag::Internal as u64)
            .uint(self.bitmap as u64)
            .array(self.children.len());
        for child in &self.children {
            enc.bytes(child);
        }
        if let Some(path) = &self.compressed_path {
            enc.bytes(path);
        }
    }

    fn decode_fields(dec: &mut Decoder, arity: usize) -> Result<Self, DecodeError> {
        if arity != 3 && arity != 4 {
            return Err(DecodeError::InvalidArity(arity));
        }
        let bitmap = dec.uint()?;
        let bitmap = u16::try_from(bitmap).map_err(|_| DecodeError::InvalidBitmap(bitmap))?;

        let count = dec.array()?;
        if count > RADIX {
            return Err(DecodeError::BitmapMismatch {
                bitmap,
                children: count,
            });
        }
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            children.push(dec.hash()?);
        }

        let compressed_path = if arity == 4 {
            Some(dec.bytes()?.to_vec())
        } else {
            None
        };
        InternalNode::new(bitmap, children, compressed_path)
    }
}

/// A leaf node, representing exactly one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafNode {
    pub key_hash: KeyHash,
    pub value_hash: ValueHash,
}

impl LeafNode {
    pub fn new(key_hash: KeyHash, value_hash: ValueHash) -> Self {
        LeafNode {
            key_hash,
            value_hash,
        }
    }

    /// The nibbles of the key hash below a leaf stored at `depth`.
    pub fn suffix(&self, depth: usize) -> NibblePath {
        if depth >= MAX_NIBBLES {
            return EMPTY_PATH;
        }
        NibblePath::from_key_hash(&self.key_hash).suffix(depth)
    }

    /// The hash of this leaf when stored at `depth`.
    pub fn hash<C: CommitmentScheme>(&self, depth: usize) -> Hash {
        C::commit_leaf(&self.suffix(depth), &self.value_hash)
    }

    fn encode_into(&self, enc: &mut Encoder) {
        enc.array(3)
            .uint(NodeTag::Leaf as u64)
            .bytes(&self.key_hash)
            .bytes(&self.value_hash);
    }

    fn decode_fields(dec: &mut Decoder, arity: usize) -> Result<Self, DecodeError> {
        if arity != 3 {
            return Err(DecodeError::InvalidArity(arity));
        }
        let key_hash = dec.hash()?;
        let value_hash = dec.hash()?;
        Ok(LeafNode::new(key_hash, value_hash))
    }
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    pub fn tag(&self) -> NodeTag {
        match self {
            Node::Internal(_) => NodeTag::Internal,
            Node::Leaf(_) => NodeTag::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// The hash of this node when stored at `depth`.
    pub fn hash<C: CommitmentScheme>(&self, depth: usize) -> Hash {
        match self {
            Node::Internal(internal) => internal.hash::<C>(),
            Node::Leaf(leaf) => leaf.hash::<C>(depth),
        }
    }

    /// Encode this node as a CBOR record.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        match self {
            Node::Internal(internal) => internal.encode_into(&mut enc),
            Node::Leaf(leaf) => leaf.encode_into(&mut enc),
        }
        enc.into_inner()
    }

    /// Decode a node from a CBOR record, rejecting trailing bytes.
    pub fn decode(record: &[u8]) -> Result<Self, DecodeError> {
        let mut dec = Decoder::new(record);
        let arity = dec.array()?;
        if arity == 0 {
            return Err(DecodeError::InvalidArity(0));
        }
        let node = match NodeTag::decode(dec.uint()?)? {
            NodeTag::Internal => Node::Internal(InternalNode::decode_fields(&mut dec, arity)?),
            NodeTag::Leaf => Node::Leaf(LeafNode::decode_fields(&mut dec, arity)?),
            NodeTag::Extension => return Err(DecodeError::ReservedExtension),
        };
        dec.finish()?;
        Ok(node)
    }
}

impl From<InternalNode> for Node {
    fn from(node: InternalNode) -> Self {
        Node::Internal(node)
    }
}

impl From<LeafNode> for Node {
    fn from(node: LeafNode) -> Self {
        Node::Leaf(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{Blake3Hasher, ClassicCommitment};

    type Classic = ClassicCommitment<Blake3Hasher>;

    fn sample_internal() -> InternalNode {
        let mut slots = [None; RADIX];
        slots[2] = Some([2u8; 32]);
        slots[7] = Some([7u8; 32]);
        slots[15] = Some([15u8; 32]);
        InternalNode::from_children(&slots).unwrap()
    }

    #[test]
    fn compact_children_follow_bitmap() {
        let node = sample_internal();
        assert_eq!(node.bitmap(), (1 << 2) | (1 << 7) | (1 << 15));
        assert_eq!(node.child_count(), 3);
        assert_eq!(node.child(7), Some(&[7u8; 32]));
        assert_eq!(node.child(3), None);
        assert_eq!(node.child(16), None);

        let nibbles: Vec<u8> = node.iter_children().map(|(n, _)| n).collect();
        assert_eq!(nibbles, vec![2, 7, 15]);
        assert_eq!(InternalNode::from_children(&node.expand()), Some(node));
    }

    #[test]
    fn with_child_replaces_or_inserts() {
        let node = sample_internal();
        let replaced = node.with_child(7, [0xaa; 32]);
        assert_eq!(replaced.child_count(), 3);
        assert_eq!(replaced.child(7), Some(&[0xaa; 32]));

        let inserted = node.with_child(0, [0xbb; 32]);
        assert_eq!(inserted.child_count(), 4);
        assert_eq!(inserted.children()[0], [0xbb; 32]);
        assert_ne!(inserted.hash::<Classic>(), node.hash::<Classic>());
    }

    #[test]
    fn no_children_is_not_a_node() {
        assert_eq!(InternalNode::from_children(&[None; RADIX]), None);
        assert_eq!(
            InternalNode::new(0, Vec::new(), None),
            Err(DecodeError::InvalidBitmap(0))
        );
        assert_eq!(
            InternalNode::new(0b11, vec![[0; 32]], None),
            Err(DecodeError::BitmapMismatch {
                bitmap: 0b11,
                children: 1
            })
        );
    }

    #[test]
    fn records_round_trip() {
        let internal = Node::Internal(sample_internal());
        assert_eq!(Node::decode(&internal.encode()), Ok(internal));

        let leaf = Node::Leaf(LeafNode::new([1; 32], [2; 32]));
        let encoded = leaf.encode();
        assert_eq!(encoded[0], 0x83);
        assert_eq!(encoded[1], NodeTag::Leaf as u8);
        assert_eq!(Node::decode(&encoded), Ok(leaf));

        let compressed = Node::Internal(
            InternalNode::new(1, vec![[3; 32]], Some(vec![0x12])).unwrap(),
        );
        assert_eq!(Node::decode(&compressed.encode()), Ok(compressed));
    }

    #[test]
    fn rejects_bad_records() {
        let mut ext = Encoder::new();
        ext.array(3).uint(2).bytes(&[0; 32]).bytes(&[0; 32]);
        assert_eq!(
            Node::decode(&ext.into_inner()),
            Err(DecodeError::ReservedExtension)
        );

        let mut unknown = Encoder::new();
        unknown.array(1).uint(9);
        assert_eq!(
            Node::decode(&unknown.into_inner()),
            Err(DecodeError::UnknownTag(9))
        );

        let mut short_leaf = Encoder::new();
        short_leaf.array(2).uint(1).bytes(&[0; 32]);
        assert_eq!(
            Node::decode(&short_leaf.into_inner()),
            Err(DecodeError::InvalidArity(2))
        );

        let mut mismatched = Encoder::new();
        mismatched.array(3).uint(0).uint(0b101).array(1).bytes(&[0; 32]);
        assert_eq!(
            Node::decode(&mismatched.into_inner()),
            Err(DecodeError::BitmapMismatch {
                bitmap: 0b101,
                children: 1
            })
        );

        let mut trailing = Node::Leaf(LeafNode::new([0; 32], [0; 32])).encode();
        trailing.push(0);
        assert_eq!(Node::decode(&trailing), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn leaf_hash_depends_on_depth() {
        let leaf = LeafNode::new([0x5a; 32], [1; 32]);
        assert_eq!(leaf.suffix(0).len(), 64);
        assert_eq!(leaf.suffix(60).len(), 4);
        assert!(leaf.suffix(64).is_empty());
        assert_ne!(leaf.hash::<Classic>(0), leaf.hash::<Classic>(1));
        assert_eq!(
            Node::Leaf(leaf).hash::<Classic>(3),
            Classic::commit_leaf(&leaf.suffix(3), &leaf.value_hash)
        );
    }
}
