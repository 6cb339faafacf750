//! The storage collaborator of the tree.
//!
//! The tree never owns its persistence. It reads nodes, values and roots through [`Store`] and
//! writes each commit through one [`CommitBatch`], which must apply atomically. An in-memory
//! implementation lives in [`memory`].

use std::sync::Arc;

use jellyfish_core::{Hash, KeyHash, NibblePath, Node, NodeKey, Version};

pub mod memory;

pub use memory::InMemoryStore;

/// A node together with the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_key: NodeKey,
    pub node: Node,
}

/// Marks a node as superseded from `stale_since_version` onwards.
///
/// Ordered by version first, so that stale nodes can be collected in version order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StaleNodeIndex {
    pub stale_since_version: Version,
    pub node_key: NodeKey,
}

/// Settings for a single commit batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitConfig {
    /// Whether the store should sync the batch to durable storage before `commit` returns.
    pub sync: bool,
}

/// Read access to committed tree data, and the entry point for commits.
pub trait Store {
    /// Get the newest node at `path` written at or before `version`.
    fn get_node(&self, version: Version, path: &NibblePath) -> anyhow::Result<Option<NodeEntry>>;

    /// Get the latest value of a key.
    fn get_value(&self, key_hash: &KeyHash) -> anyhow::Result<Option<Vec<u8>>>;

    /// Get the value of a key as of `version`.
    fn get_value_at(&self, key_hash: &KeyHash, version: Version)
        -> anyhow::Result<Option<Vec<u8>>>;

    /// Get the root hash committed for exactly `version`.
    fn root_hash(&self, version: Version) -> anyhow::Result<Option<Hash>>;

    /// Get the most recently committed version and its root hash.
    fn latest_root(&self) -> anyhow::Result<Option<(Version, Hash)>>;

    /// Start an atomic commit whose first version is `version`.
    fn begin_commit(
        &self,
        version: Version,
        config: &CommitConfig,
    ) -> anyhow::Result<Box<dyn CommitBatch + '_>>;
}

/// A set of writes applied all at once by [`CommitBatch::commit`].
///
/// Nothing written to a batch is visible before `commit` returns successfully. Dropping a batch
/// without committing it discards everything.
pub trait CommitBatch {
    fn put_node(&mut self, node_key: NodeKey, node: Node) -> anyhow::Result<()>;

    fn mark_stale(&mut self, index: StaleNodeIndex) -> anyhow::Result<()>;

    fn put_value(&mut self, version: Version, key_hash: KeyHash, value: Vec<u8>)
        -> anyhow::Result<()>;

    fn delete_value(&mut self, version: Version, key_hash: KeyHash) -> anyhow::Result<()>;

    fn set_root_hash(&mut self, version: Version, root_hash: Hash) -> anyhow::Result<()>;

    /// Apply every write in the batch atomically.
    fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

impl<S: Store + ?Sized> Store for &S {
    fn get_node(&self, version: Version, path: &NibblePath) -> anyhow::Result<Option<NodeEntry>> {
        (**self).get_node(version, path)
    }

    fn get_value(&self, key_hash: &KeyHash) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get_value(key_hash)
    }

    fn get_value_at(
        &self,
        key_hash: &KeyHash,
        version: Version,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get_value_at(key_hash, version)
    }

    fn root_hash(&self, version: Version) -> anyhow::Result<Option<Hash>> {
        (**self).root_hash(version)
    }

    fn latest_root(&self) -> anyhow::Result<Option<(Version, Hash)>> {
        (**self).latest_root()
    }

    fn begin_commit(
        &self,
        version: Version,
        config: &CommitConfig,
    ) -> anyhow::Result<Box<dyn CommitBatch + '_>> {
        (**self).begin_commit(version, config)
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get_node(&self, version: Version, path: &NibblePath) -> anyhow::Result<Option<NodeEntry>> {
        (**self).get_node(version, path)
    }

    fn get_value(&self, key_hash: &KeyHash) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get_value(key_hash)
    }

    fn get_value_at(
        &self,
        key_hash: &KeyHash,
        version: Version,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get_value_at(key_hash, version)
    }

    fn root_hash(&self, version: Version) -> anyhow::Result<Option<Hash>> {
        (**self).root_hash(version)
    }

    fn latest_root(&self) -> anyhow::Result<Option<(Version, Hash)>> {
        (**self).latest_root()
    }

    fn begin_commit(
        &self,
        version: Version,
        config: &CommitConfig,
    ) -> anyhow::Result<Box<dyn CommitBatch + '_>> {
        (**self).begin_commit(version, config)
    }
}
