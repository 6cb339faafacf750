use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use jellyfish_core::{Hash, KeyHash, NibblePath, Node, NodeKey, Version};
use parking_lot::RwLock;

use super::{CommitBatch, CommitConfig, NodeEntry, StaleNodeIndex, Store};

/// A [`Store`] kept entirely in memory.
///
/// Nodes are indexed by `(path, version)` so that the newest node at a path as of some version is
/// a single range lookup. Values keep their full history, with `None` marking a delete.
#[derive(Default)]
pub struct InMemoryStore {
    shared: RwLock<Shared>,
    fail_next_commit: AtomicBool,
}

#[derive(Default)]
struct Shared {
    nodes: BTreeMap<(NibblePath, Version), Node>,
    /// Stale node keys and the version they became stale at.
    stale: BTreeMap<NodeKey, Version>,
    values: HashMap<KeyHash, BTreeMap<Version, Option<Vec<u8>>>>,
    roots: BTreeMap<Version, Hash>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// The number of stored nodes, stale or not.
    pub fn node_count(&self) -> usize {
        self.shared.read().nodes.len()
    }

    /// The number of nodes marked stale.
    pub fn stale_count(&self) -> usize {
        self.shared.read().stale.len()
    }

    /// All nodes which became stale at or before `version`, in version order.
    ///
    /// These are the nodes an external collector may delete once no reader needs a version
    /// older than `version`.
    pub fn stale_nodes_up_to(&self, version: Version) -> Vec<StaleNodeIndex> {
        let shared = self.shared.read();
        let mut indices: Vec<_> = shared
            .stale
            .iter()
            .filter(|(_, since)| **since <= version)
            .map(|(node_key, since)| StaleNodeIndex {
                stale_since_version: *since,
                node_key: node_key.clone(),
            })
            .collect();
        indices.sort();
        indices
    }

    /// Roll the store back to `version`, forgetting everything committed after it.
    ///
    /// Nodes that became stale after `version` are live again.
    pub fn truncate_after(&self, version: Version) {
        let mut shared = self.shared.write();
        shared.nodes.retain(|(_, v), _| *v <= version);
        shared.stale.retain(|_, since| *since <= version);
        shared.roots.retain(|v, _| *v <= version);
        for history in shared.values.values_mut() {
            history.retain(|v, _| *v <= version);
        }
        shared.values.retain(|_, history| !history.is_empty());
    }

    /// Whether the node under exactly this key is marked stale.
    pub fn is_stale(&self, node_key: &NodeKey) -> bool {
        self.shared.read().stale.contains_key(node_key)
    }
}

impl Store for InMemoryStore {
    fn get_node(&self, version: Version, path: &NibblePath) -> anyhow::Result<Option<NodeEntry>> {
        let shared = self.shared.read();
        let entry = shared
            .nodes
            .range((path.clone(), 0)..=(path.clone(), version))
            .next_back()
            .map(|((path, v), node)| NodeEntry {
                node_key: NodeKey::new(*v, path.clone()),
                node: node.clone(),
            });
        Ok(entry)
    }

    fn get_value(&self, key_hash: &KeyHash) -> anyhow::Result<Option<Vec<u8>>> {
        let shared = self.shared.read();
        Ok(shared
            .values
            .get(key_hash)
            .and_then(|history| history.last_key_value())
            .and_then(|(_, value)| value.clone()))
    }

    fn get_value_at(
        &self,
        key_hash: &KeyHash,
        version: Version,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let shared = self.shared.read();
        Ok(shared
            .values
            .get(key_hash)
            .and_then(|history| history.range(..=version).next_back())
            .and_then(|(_, value)| value.clone()))
    }

    fn root_hash(&self, version: Version) -> anyhow::Result<Option<Hash>> {
        Ok(self.shared.read().roots.get(&version).copied())
    }

    fn latest_root(&self) -> anyhow::Result<Option<(Version, Hash)>> {
        Ok(self
            .shared
            .read()
            .roots
            .last_key_value()
            .map(|(v, h)| (*v, *h)))
    }

    fn begin_commit(
        &self,
        version: Version,
        _config: &CommitConfig,
    ) -> anyhow::Result<Box<dyn CommitBatch + '_>> {
        if let Some((latest, _)) = self.latest_root()? {
            if version <= latest {
                bail!("commit at version {version} does not follow latest version {latest}");
            }
        }
        Ok(Box::new(MemoryBatch {
            store: self,
            nodes: Vec::new(),
            stale: Vec::new(),
            values: Vec::new(),
            roots: Vec::new(),
        }))
    }
}

struct MemoryBatch<'a> {
    store: &'a InMemoryStore,
    nodes: Vec<(NodeKey, Node)>,
    stale: Vec<StaleNodeIndex>,
    values: Vec<(Version, KeyHash, Option<Vec<u8>>)>,
    roots: Vec<(Version, Hash)>,
}

impl CommitBatch for MemoryBatch<'_> {
    fn put_node(&mut self, node_key: NodeKey, node: Node) -> anyhow::Result<()> {
        self.nodes.push((node_key, node));
        Ok(())
    }

    fn mark_stale(&mut self, index: StaleNodeIndex) -> anyhow::Result<()> {
        self.stale.push(index);
        Ok(())
    }

    fn put_value(
        &mut self,
        version: Version,
        key_hash: KeyHash,
        value: Vec<u8>,
    ) -> anyhow::Result<()> {
        self.values.push((version, key_hash, Some(value)));
        Ok(())
    }

    fn delete_value(&mut self, version: Version, key_hash: KeyHash) -> anyhow::Result<()> {
        self.values.push((version, key_hash, None));
        Ok(())
    }

    fn set_root_hash(&mut self, version: Version, root_hash: Hash) -> anyhow::Result<()> {
        self.roots.push((version, root_hash));
        Ok(())
    }

    fn commit(self: Box<Self>) -> anyhow::Result<()> {
        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            bail!("injected commit failure");
        }

        let MemoryBatch {
            store,
            nodes,
            stale,
            values,
            roots,
        } = *self;

        let mut shared = store.shared.write();
        for (node_key, node) in nodes {
            let path = node_key.path().clone();
            shared.nodes.insert((path, node_key.version()), node);
        }
        for index in stale {
            shared
                .stale
                .insert(index.node_key, index.stale_since_version);
        }
        for (version, key_hash, value) in values {
            shared
                .values
                .entry(key_hash)
                .or_default()
                .insert(version, value);
        }
        for (version, root) in roots {
            shared.roots.insert(version, root);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jellyfish_core::{LeafNode, EMPTY_PATH};

    fn leaf(byte: u8) -> Node {
        Node::Leaf(LeafNode::new([byte; 32], [byte; 32]))
    }

    fn commit(store: &InMemoryStore, version: Version, f: impl FnOnce(&mut dyn CommitBatch)) {
        let mut batch = store.begin_commit(version, &CommitConfig::default()).unwrap();
        f(&mut *batch);
        batch.set_root_hash(version, [version as u8; 32]).unwrap();
        batch.commit().unwrap();
    }

    #[test]
    fn node_lookup_is_floor_by_version() {
        let store = InMemoryStore::new();
        commit(&store, 1, |b| b.put_node(NodeKey::root(1), leaf(1)).unwrap());
        commit(&store, 4, |b| b.put_node(NodeKey::root(4), leaf(4)).unwrap());

        assert_eq!(store.get_node(0, &EMPTY_PATH).unwrap(), None);
        let at = |v| store.get_node(v, &EMPTY_PATH).unwrap().unwrap();
        assert_eq!(at(1).node_key, NodeKey::root(1));
        assert_eq!(at(3).node_key, NodeKey::root(1));
        assert_eq!(at(4).node, leaf(4));
        assert_eq!(at(100).node_key, NodeKey::root(4));

        let child = EMPTY_PATH.child(0).unwrap();
        assert_eq!(store.get_node(4, &child).unwrap(), None);
    }

    #[test]
    fn value_history_and_tombstones() {
        let store = InMemoryStore::new();
        let key = [9u8; 32];
        commit(&store, 1, |b| b.put_value(1, key, b"a".to_vec()).unwrap());
        commit(&store, 2, |b| b.put_value(2, key, b"b".to_vec()).unwrap());
        commit(&store, 3, |b| b.delete_value(3, key).unwrap());

        assert_eq!(store.get_value_at(&key, 0).unwrap(), None);
        assert_eq!(store.get_value_at(&key, 1).unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.get_value_at(&key, 2).unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.get_value_at(&key, 3).unwrap(), None);
        assert_eq!(store.get_value(&key).unwrap(), None);
    }

    #[test]
    fn dropped_or_failed_batches_apply_nothing() {
        let store = InMemoryStore::new();
        {
            let mut batch = store.begin_commit(1, &CommitConfig::default()).unwrap();
            batch.put_node(NodeKey::root(1), leaf(1)).unwrap();
            batch.set_root_hash(1, [1; 32]).unwrap();
        }
        assert_eq!(store.latest_root().unwrap(), None);

        store.fail_next_commit();
        let mut batch = store.begin_commit(1, &CommitConfig::default()).unwrap();
        batch.put_node(NodeKey::root(1), leaf(1)).unwrap();
        batch.set_root_hash(1, [1; 32]).unwrap();
        assert!(batch.commit().is_err());
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.latest_root().unwrap(), None);

        // the failure is one-shot.
        commit(&store, 1, |b| b.put_node(NodeKey::root(1), leaf(1)).unwrap());
        assert_eq!(store.latest_root().unwrap(), Some((1, [1; 32])));
    }

    #[test]
    fn commits_must_advance() {
        let store = InMemoryStore::new();
        commit(&store, 5, |_| ());
        assert!(store.begin_commit(5, &CommitConfig::default()).is_err());
        assert!(store.begin_commit(6, &CommitConfig::default()).is_ok());
    }

    #[test]
    fn stale_listing_and_truncation() {
        let store = InMemoryStore::new();
        commit(&store, 1, |b| b.put_node(NodeKey::root(1), leaf(1)).unwrap());
        commit(&store, 2, |b| {
            b.put_node(NodeKey::root(2), leaf(2)).unwrap();
            b.mark_stale(StaleNodeIndex {
                stale_since_version: 2,
                node_key: NodeKey::root(1),
            })
            .unwrap();
            b.put_value(2, [2; 32], b"two".to_vec()).unwrap();
        });

        assert!(store.stale_nodes_up_to(1).is_empty());
        assert_eq!(
            store.stale_nodes_up_to(2),
            vec![StaleNodeIndex {
                stale_since_version: 2,
                node_key: NodeKey::root(1),
            }]
        );
        assert!(store.is_stale(&NodeKey::root(1)));

        store.truncate_after(1);
        assert_eq!(store.latest_root().unwrap(), Some((1, [1; 32])));
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.stale_count(), 0);
        assert_eq!(store.get_value(&[2; 32]).unwrap(), None);
        assert_eq!(
            store.get_node(2, &EMPTY_PATH).unwrap().unwrap().node_key,
            NodeKey::root(1)
        );
    }
}
