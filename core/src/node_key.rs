//! Identity of a stored node.

use core::fmt;

use crate::nibble::{InvalidNibblePath, NibblePath, EMPTY_PATH};

/// A version of the tree. Every committed write set produces exactly one new version.
pub type Version = u64;

/// The identity of a node: the version that wrote it and its position in the tree.
///
/// Node keys are never mutated. The same path holds different nodes at different versions, and a
/// node is superseded by writing a new key at the same path with a greater version.
///
/// Keys order by version first and then by path, which gives write batches a deterministic
/// layout where each version's nodes are contiguous and parents precede children.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    // field order matters for the derived `Ord`.
    version: Version,
    path: NibblePath,
}

impl NodeKey {
    pub fn new(version: Version, path: NibblePath) -> Self {
        NodeKey { version, path }
    }

    /// The key of the root node written at `version`.
    pub fn root(version: Version) -> Self {
        NodeKey {
            version,
            path: EMPTY_PATH,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn path(&self) -> &NibblePath {
        &self.path
    }

    /// The key of a child node written at `version`.
    pub fn child(&self, version: Version, nibble: u8) -> Result<Self, InvalidNibblePath> {
        Ok(NodeKey {
            version,
            path: self.path.child(nibble)?,
        })
    }

    /// The same path, rewritten at another version.
    pub fn at_version(&self, version: Version) -> Self {
        NodeKey {
            version,
            path: self.path.clone(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]@{}", self.path, self.version)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", self)
    }
}
