//! A write-batching cache over the store, spanning one or more transactions.
//!
//! Every transaction writes at a single version. While a transaction is in progress its nodes are
//! *staged*, keyed by path alone, because all of them share the transaction's version. Freezing
//! the transaction moves them into the *frozen* tier, keyed by full [`NodeKey`], and advances the
//! version. Reads resolve through the staged tier, then the frozen tier, then the store, so each
//! transaction sees its own writes plus every earlier transaction of the batch without anything
//! being written to storage. The accumulated batch is committed atomically at the end.
//!
//! Nodes are never mutated. Replacing a node is a delete followed by a create: deleting a node
//! staged by the current transaction simply forgets it, while deleting any older node records it
//! as stale from the current version on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use jellyfish_core::{Hash, KeyHash, NibblePath, Node, NodeKey, Version};

use crate::error::{Error, Result};
use crate::store::{NodeEntry, StaleNodeIndex, Store};

/// Node counts of a single transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub new_nodes: usize,
    pub new_leaves: usize,
    pub stale_nodes: usize,
    pub stale_leaves: usize,
}

/// A change to the value index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueOperation {
    Put { key_hash: KeyHash, value: Vec<u8> },
    Delete { key_hash: KeyHash },
}

impl ValueOperation {
    pub fn key_hash(&self) -> &KeyHash {
        match self {
            ValueOperation::Put { key_hash, .. } | ValueOperation::Delete { key_hash } => key_hash,
        }
    }
}

/// Everything a batch of transactions writes, ready for an atomic commit.
#[derive(Debug, Clone, Default)]
pub struct TreeUpdateBatch {
    /// New nodes, ordered by version and then path.
    pub nodes: BTreeMap<NodeKey, Node>,
    pub stale_node_index_batch: BTreeSet<StaleNodeIndex>,
    /// Per-version node counts, in version order.
    pub node_stats: Vec<(Version, NodeStats)>,
    /// Value writes, in version order.
    pub value_operations: Vec<(Version, ValueOperation)>,
    /// Root hashes, in version order.
    pub root_hashes: Vec<(Version, Hash)>,
}

pub struct TreeCache<'a, S: ?Sized> {
    store: &'a S,
    next_version: Version,

    // current transaction.
    staged_nodes: HashMap<NibblePath, Node>,
    staged_stale: BTreeSet<StaleNodeIndex>,
    staged_values: BTreeMap<KeyHash, ValueOperation>,
    stats: NodeStats,

    // earlier transactions of this batch.
    frozen_nodes: BTreeMap<NodeKey, Node>,
    frozen_versions: HashMap<NibblePath, Vec<Version>>,
    frozen_stale: BTreeSet<StaleNodeIndex>,
    frozen_values: Vec<(Version, ValueOperation)>,
    frozen_stats: Vec<(Version, NodeStats)>,
    root_hashes: Vec<(Version, Hash)>,

    stale_keys: HashSet<NodeKey>,
}

impl<'a, S: Store + ?Sized> TreeCache<'a, S> {
    /// Create a cache whose first transaction writes at `next_version`.
    pub fn new(store: &'a S, next_version: Version) -> Self {
        TreeCache {
            store,
            next_version,
            staged_nodes: HashMap::new(),
            staged_stale: BTreeSet::new(),
            staged_values: BTreeMap::new(),
            stats: NodeStats::default(),
            frozen_nodes: BTreeMap::new(),
            frozen_versions: HashMap::new(),
            frozen_stale: BTreeSet::new(),
            frozen_values: Vec::new(),
            frozen_stats: Vec::new(),
            root_hashes: Vec::new(),
            stale_keys: HashSet::new(),
        }
    }

    /// The version of the transaction in progress.
    pub fn next_version(&self) -> Version {
        self.next_version
    }

    /// Resolve a node.
    ///
    /// Staged nodes match on path alone. Frozen nodes match on the exact key, or else the newest
    /// frozen node at the path no newer than `node_key`'s version. The store is consulted last
    /// with the same floor semantics.
    pub fn get_node(&self, node_key: &NodeKey) -> Result<Option<NodeEntry>> {
        let path = node_key.path();
        if let Some(node) = self.staged_nodes.get(path) {
            return Ok(Some(NodeEntry {
                node_key: node_key.at_version(self.next_version),
                node: node.clone(),
            }));
        }

        if let Some(node) = self.frozen_nodes.get(node_key) {
            return Ok(Some(NodeEntry {
                node_key: node_key.clone(),
                node: node.clone(),
            }));
        }

        let frozen_floor = self.frozen_versions.get(path).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|v| **v <= node_key.version())
                .copied()
        });
        if let Some(version) = frozen_floor {
            let key = node_key.at_version(version);
            if let Some(node) = self.frozen_nodes.get(&key) {
                return Ok(Some(NodeEntry {
                    node_key: key,
                    node: node.clone(),
                }));
            }
        }

        Ok(self.store.get_node(node_key.version(), path)?)
    }

    /// Stage a new node in the current transaction.
    ///
    /// Fails if a node is already staged at the same path.
    pub fn put_node(&mut self, node_key: NodeKey, node: Node) -> Result<()> {
        if node_key.version() != self.next_version {
            return Err(Error::Corrupted(format!(
                "node {} staged in transaction {}",
                node_key, self.next_version
            )));
        }
        if self.staged_nodes.contains_key(node_key.path()) {
            return Err(Error::DuplicateNode(node_key));
        }

        self.stats.new_nodes += 1;
        if node.is_leaf() {
            self.stats.new_leaves += 1;
        }
        self.staged_nodes.insert(node_key.path().clone(), node);
        Ok(())
    }

    /// Delete a node as part of replacing it.
    ///
    /// A node staged by the current transaction is un-staged. Any other node is marked stale from
    /// the current version on, which fails if it was already marked.
    pub fn delete_node(&mut self, node_key: &NodeKey, is_leaf: bool) -> Result<()> {
        if node_key.version() == self.next_version {
            if self.staged_nodes.remove(node_key.path()).is_some() {
                self.stats.new_nodes -= 1;
                if is_leaf {
                    self.stats.new_leaves -= 1;
                }
                return Ok(());
            }
        }

        if !self.stale_keys.insert(node_key.clone()) {
            return Err(Error::StaleTwice(node_key.clone()));
        }
        self.staged_stale.insert(StaleNodeIndex {
            stale_since_version: self.next_version,
            node_key: node_key.clone(),
        });
        self.stats.stale_nodes += 1;
        if is_leaf {
            self.stats.stale_leaves += 1;
        }
        Ok(())
    }

    /// Record a value write of the current transaction. A later write to the same key wins.
    pub fn put_value(&mut self, key_hash: KeyHash, value: Vec<u8>) {
        self.staged_values
            .insert(key_hash, ValueOperation::Put { key_hash, value });
    }

    /// Close the current transaction with its root hash and start the next one.
    pub fn freeze(&mut self, root_hash: Hash) {
        let version = self.next_version;

        for (path, node) in self.staged_nodes.drain() {
            self.frozen_versions.entry(path.clone()).or_default().push(version);
            self.frozen_nodes.insert(NodeKey::new(version, path), node);
        }
        self.frozen_stale.append(&mut self.staged_stale);
        self.frozen_values.extend(
            std::mem::take(&mut self.staged_values)
                .into_values()
                .map(|op| (version, op)),
        );
        self.frozen_stats
            .push((version, std::mem::take(&mut self.stats)));
        self.root_hashes.push((version, root_hash));

        self.next_version += 1;
    }

    /// Take the frozen transactions as a batch.
    ///
    /// Fails if the current transaction has unfrozen changes.
    pub fn to_batch(self) -> Result<TreeUpdateBatch> {
        if !self.staged_nodes.is_empty()
            || !self.staged_stale.is_empty()
            || !self.staged_values.is_empty()
        {
            return Err(Error::Corrupted(format!(
                "transaction {} was not frozen",
                self.next_version
            )));
        }

        Ok(TreeUpdateBatch {
            nodes: self.frozen_nodes,
            stale_node_index_batch: self.frozen_stale,
            node_stats: self.frozen_stats,
            value_operations: self.frozen_values,
            root_hashes: self.root_hashes,
        })
    }
}
