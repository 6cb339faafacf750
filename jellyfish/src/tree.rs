use std::collections::BTreeMap;
use std::marker::PhantomData;

use jellyfish_core::{
    hasher::Blake3Hasher,
    nibble::{nibble_at, MAX_NIBBLES},
    proof::{verify_wire, BranchStep, JmtProof, Neighbor},
    ClassicCommitment, CommitmentScheme, Hash, HashFunction, InternalNode, KeyHash, LeafNode,
    NibblePath, Node, NodeKey, Version, EMPTY_PATH,
};

use crate::error::{Error, Result};
use crate::metrics::{Metric, Metrics};
use crate::options::Options;
use crate::store::{CommitConfig, Store};
use crate::tree_cache::{TreeCache, TreeUpdateBatch, ValueOperation};

/// The outcome of committing one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub version: Version,
    pub root_hash: Hash,
    /// Nodes written at this version.
    pub nodes: BTreeMap<NodeKey, Node>,
    /// Nodes superseded by this version.
    pub stale_nodes: Vec<NodeKey>,
    pub value_operations: Vec<ValueOperation>,
}

/// A versioned Jellyfish Merkle Tree over a [`Store`].
///
/// `H` hashes keys and values; `C` turns nodes into hashes. Reads take `&self` and only touch
/// committed versions, so any number of trees may read the same store concurrently. Writes take
/// `&mut self`, which keeps a single writer per tree handle.
pub struct JellyfishMerkleTree<S, H = Blake3Hasher, C = ClassicCommitment<H>> {
    store: S,
    options: Options,
    metrics: Metrics,
    _marker: PhantomData<fn() -> (H, C)>,
}

impl<S: Store, H: HashFunction, C: CommitmentScheme> JellyfishMerkleTree<S, H, C> {
    pub fn new(store: S, options: Options) -> Self {
        let metrics = Metrics::new(options.metrics);
        JellyfishMerkleTree {
            store,
            options,
            metrics,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The root hash committed at `version`, if that version exists.
    pub fn root_hash(&self, version: Version) -> Result<Option<Hash>> {
        Ok(self.store.root_hash(version)?)
    }

    /// The most recently committed version.
    pub fn latest_version(&self) -> Result<Option<Version>> {
        Ok(self.store.latest_root()?.map(|(version, _)| version))
    }

    /// Insert or replace a set of key-value pairs as a new version.
    ///
    /// `version` must be greater than every committed version. Keys are applied in key-hash
    /// order; if a key appears more than once, the last value wins. An empty set still commits
    /// a version whose root equals the previous one.
    pub fn put<K, V>(
        &mut self,
        version: Version,
        updates: impl IntoIterator<Item = (K, V)>,
    ) -> Result<CommitResult>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut results = self.put_value_sets(version, vec![updates])?;
        results
            .pop()
            .ok_or_else(|| Error::Corrupted("commit produced no result".into()))
    }

    /// Apply several write sets at consecutive versions starting at `first_version`, committing
    /// all of them in one atomic batch.
    pub fn put_value_sets<I, K, V>(
        &mut self,
        first_version: Version,
        value_sets: Vec<I>,
    ) -> Result<Vec<CommitResult>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if value_sets.is_empty() {
            return Err(Error::InvalidArgument("no value sets to commit".into()));
        }

        let latest = self.store.latest_root()?;
        if let Some((latest, _)) = latest {
            if first_version <= latest {
                return Err(Error::NonMonotonicVersion {
                    latest,
                    requested: first_version,
                });
            }
        }

        let _timer = self.metrics.record(Metric::CommitTime);
        let mut root_hash = latest.map_or_else(C::null_hash, |(_, root)| root);
        let mut cache = TreeCache::new(&self.store, first_version);

        for value_set in value_sets {
            let version = cache.next_version();
            let updates: BTreeMap<KeyHash, Vec<u8>> = value_set
                .into_iter()
                .map(|(k, v)| (H::digest(k.as_ref()), v.as_ref().to_vec()))
                .collect();

            for (key_hash, value) in updates {
                let leaf = LeafNode::new(key_hash, H::digest(&value));
                tracing::trace!(version, key_hash = %hex::encode(key_hash), "insert");
                root_hash = self.insert_at(&mut cache, EMPTY_PATH, version, leaf)?;
                cache.put_value(key_hash, value);
            }
            cache.freeze(root_hash);
        }

        let batch = cache.to_batch()?;
        let results = split_results(&batch);
        self.commit_batch(first_version, batch)?;

        for result in &results {
            tracing::debug!(
                version = result.version,
                root = %hex::encode(result.root_hash),
                nodes = result.nodes.len(),
                stale = result.stale_nodes.len(),
                "committed version"
            );
        }
        Ok(results)
    }

    /// Insert `leaf` into the subtree at `path`, returning the new hash of that subtree.
    fn insert_at(
        &self,
        cache: &mut TreeCache<'_, S>,
        path: NibblePath,
        version: Version,
        leaf: LeafNode,
    ) -> Result<Hash> {
        let depth = path.len();
        if depth > MAX_NIBBLES {
            return Err(Error::DepthExceeded);
        }

        let Some(entry) = cache.get_node(&NodeKey::new(version, path.clone()))? else {
            if !path.is_empty() {
                return Err(Error::Corrupted(format!("missing node at path [{}]", path)));
            }
            return self.create_leaf(cache, path, version, leaf);
        };

        match entry.node {
            Node::Leaf(existing) if existing.key_hash == leaf.key_hash => {
                cache.delete_node(&entry.node_key, true)?;
                self.create_leaf(cache, path, version, leaf)
            }
            Node::Leaf(existing) => {
                cache.delete_node(&entry.node_key, true)?;
                self.split_leaf(cache, path, version, existing, leaf)
            }
            Node::Internal(internal) => {
                if depth >= MAX_NIBBLES {
                    return Err(Error::DepthExceeded);
                }
                cache.delete_node(&entry.node_key, false)?;

                let nibble = nibble_at(&leaf.key_hash, depth);
                let child_path = path.child(nibble).map_err(|_| Error::DepthExceeded)?;
                let child_hash = if internal.child(nibble).is_some() {
                    self.insert_at(cache, child_path, version, leaf)?
                } else {
                    self.create_leaf(cache, child_path, version, leaf)?
                };

                let updated = internal.with_child(nibble, child_hash);
                let hash = updated.hash::<C>();
                cache.put_node(NodeKey::new(version, path), Node::Internal(updated))?;
                Ok(hash)
            }
        }
    }

    fn create_leaf(
        &self,
        cache: &mut TreeCache<'_, S>,
        path: NibblePath,
        version: Version,
        leaf: LeafNode,
    ) -> Result<Hash> {
        let hash = leaf.hash::<C>(path.len());
        cache.put_node(NodeKey::new(version, path), Node::Leaf(leaf))?;
        Ok(hash)
    }

    /// Replace the leaf `existing` at `path` with the internal nodes separating it from `leaf`:
    /// one single-child node per shared nibble, then a node holding both leaves.
    fn split_leaf(
        &self,
        cache: &mut TreeCache<'_, S>,
        path: NibblePath,
        version: Version,
        existing: LeafNode,
        leaf: LeafNode,
    ) -> Result<Hash> {
        let depth = path.len();
        let divergence = (depth..MAX_NIBBLES)
            .find(|i| nibble_at(&existing.key_hash, *i) != nibble_at(&leaf.key_hash, *i))
            .ok_or(Error::DepthExceeded)?;

        let fork = NibblePath::from_key_hash_prefix(&leaf.key_hash, divergence);
        let mut slots = [None; 16];
        for l in [existing, leaf] {
            let nibble = nibble_at(&l.key_hash, divergence);
            let child_path = fork.child(nibble).map_err(|_| Error::DepthExceeded)?;
            slots[nibble as usize] = Some(self.create_leaf(cache, child_path, version, l)?);
        }

        let mut hash = self.put_internal(cache, fork, version, &slots)?;
        for d in (depth..divergence).rev() {
            let mut slots = [None; 16];
            slots[nibble_at(&leaf.key_hash, d) as usize] = Some(hash);
            let prefix = NibblePath::from_key_hash_prefix(&leaf.key_hash, d);
            hash = self.put_internal(cache, prefix, version, &slots)?;
        }
        Ok(hash)
    }

    fn put_internal(
        &self,
        cache: &mut TreeCache<'_, S>,
        path: NibblePath,
        version: Version,
        slots: &[Option<Hash>; 16],
    ) -> Result<Hash> {
        let node = InternalNode::from_children(slots)
            .ok_or_else(|| Error::Corrupted(format!("empty internal node at [{}]", path)))?;
        let hash = node.hash::<C>();
        cache.put_node(NodeKey::new(version, path), Node::Internal(node))?;
        Ok(hash)
    }

    fn commit_batch(&self, first_version: Version, batch: TreeUpdateBatch) -> Result<()> {
        let config = CommitConfig {
            sync: self.options.sync_commits,
        };
        let node_count = batch.nodes.len() as u64;
        let stale_count = batch.stale_node_index_batch.len() as u64;
        let version_count = batch.root_hashes.len() as u64;

        let write = || -> anyhow::Result<()> {
            let mut commit = self.store.begin_commit(first_version, &config)?;
            for (node_key, node) in batch.nodes {
                commit.put_node(node_key, node)?;
            }
            for index in batch.stale_node_index_batch {
                commit.mark_stale(index)?;
            }
            for (version, op) in batch.value_operations {
                match op {
                    ValueOperation::Put { key_hash, value } => {
                        commit.put_value(version, key_hash, value)?
                    }
                    ValueOperation::Delete { key_hash } => commit.delete_value(version, key_hash)?,
                }
            }
            for (version, root_hash) in batch.root_hashes {
                commit.set_root_hash(version, root_hash)?;
            }
            commit.commit()
        };

        if let Err(e) = write() {
            tracing::warn!(first_version, error = %e, "commit failed, nothing was written");
            return Err(Error::Storage(e));
        }

        self.metrics.count_n(Metric::Commits, version_count);
        self.metrics.count_n(Metric::NodesWritten, node_count);
        self.metrics.count_n(Metric::NodesMarkedStale, stale_count);
        self.metrics.set_last_batch_size(node_count);
        Ok(())
    }

    /// Get the latest value of a key. This reads the value index only and proves nothing.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key_hash = H::digest(key.as_ref());
        self.read_value(|| self.store.get_value(&key_hash))
    }

    /// Get the value of a key as of `version`. This reads the value index only and proves nothing.
    pub fn get_at(&self, key: impl AsRef<[u8]>, version: Version) -> Result<Option<Vec<u8>>> {
        let key_hash = H::digest(key.as_ref());
        self.read_value(|| self.store.get_value_at(&key_hash, version))
    }

    fn read_value(
        &self,
        read: impl FnOnce() -> anyhow::Result<Option<Vec<u8>>>,
    ) -> Result<Option<Vec<u8>>> {
        let _timer = self.metrics.record(Metric::ReadTime);
        let value = read()?;
        self.metrics.count(Metric::ValueReads);
        if value.is_none() {
            self.metrics.count(Metric::ValueReadMisses);
        }
        Ok(value)
    }

    /// Prove the value of a key, or its absence, at `version`.
    ///
    /// Returns `None` if no such version was committed.
    pub fn get_proof(&self, key: impl AsRef<[u8]>, version: Version) -> Result<Option<JmtProof>> {
        let _timer = self.metrics.record(Metric::ProofTime);
        let Some(root_hash) = self.store.root_hash(version)? else {
            return Ok(None);
        };

        let key_hash = H::digest(key.as_ref());
        let proof = if root_hash == C::null_hash() {
            JmtProof::NonInclusionEmpty { steps: Vec::new() }
        } else {
            self.prove(&key_hash, version)?
        };

        if proof.is_inclusion() {
            self.metrics.count(Metric::InclusionProofs);
        } else {
            self.metrics.count(Metric::ExclusionProofs);
        }
        Ok(Some(proof))
    }

    fn prove(&self, key_hash: &KeyHash, version: Version) -> Result<JmtProof> {
        let mut steps = Vec::new();
        let mut path = EMPTY_PATH;

        loop {
            let entry = self.store.get_node(version, &path)?.ok_or_else(|| {
                Error::Corrupted(format!("missing node at [{}] for version {}", path, version))
            })?;
            let depth = path.len();

            let internal = match entry.node {
                Node::Internal(internal) => internal,
                Node::Leaf(leaf) if leaf.key_hash == *key_hash => {
                    let value = self
                        .store
                        .get_value_at(key_hash, version)?
                        .ok_or_else(|| Error::Corrupted("leaf without a value".into()))?;
                    if H::digest(&value) != leaf.value_hash {
                        return Err(Error::Corrupted("value does not match its leaf".into()));
                    }
                    return Ok(JmtProof::Inclusion {
                        steps,
                        value,
                        value_hash: leaf.value_hash,
                        suffix: leaf.suffix(depth),
                        leaf_key_hash: leaf.key_hash,
                    });
                }
                Node::Leaf(leaf) => {
                    return Ok(JmtProof::NonInclusionDifferentLeaf {
                        steps,
                        conflicting_key_hash: leaf.key_hash,
                        conflicting_value_hash: leaf.value_hash,
                        conflicting_suffix: leaf.suffix(depth),
                    });
                }
            };

            if depth >= MAX_NIBBLES {
                return Err(Error::DepthExceeded);
            }
            let nibble = nibble_at(key_hash, depth);
            let mut step = BranchStep::new(path.clone(), &internal, nibble);
            if self.options.proof_neighbors {
                if let Some(neighbor_nibble) = step.neighbor_nibble {
                    step.neighbor = Some(self.neighbor(version, &path, neighbor_nibble)?);
                }
            }
            tracing::trace!(version, depth, nibble, "proof step");
            steps.push(step);

            if internal.child(nibble).is_none() {
                return Ok(JmtProof::NonInclusionEmpty { steps });
            }
            path = path.child(nibble).map_err(|_| Error::DepthExceeded)?;
        }
    }

    fn neighbor(&self, version: Version, parent: &NibblePath, nibble: u8) -> Result<Neighbor> {
        let path = parent.child(nibble).map_err(|_| Error::DepthExceeded)?;
        let entry = self.store.get_node(version, &path)?.ok_or_else(|| {
            Error::Corrupted(format!("missing sibling at [{}] for version {}", path, version))
        })?;
        Ok(match entry.node {
            Node::Leaf(leaf) => Neighbor::Leaf {
                key_hash: leaf.key_hash,
                value_hash: leaf.value_hash,
            },
            Node::Internal(internal) => Neighbor::Fork {
                root: internal.hash::<C>(),
                prefix: path,
            },
        })
    }

    /// Prove a key at `version` and encode the proof in its wire form.
    pub fn get_proof_wire(
        &self,
        key: impl AsRef<[u8]>,
        version: Version,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.get_proof(key, version)?.map(|proof| proof.to_wire()))
    }

    /// Verify a proof wire against `expected_root`.
    ///
    /// With `including` set, checks that `key` maps to `value`; otherwise that `key` is absent.
    /// Malformed wires are errors; well-formed wires that do not prove the claim give `false`.
    pub fn verify_proof_wire(
        &self,
        expected_root: &Hash,
        key: impl AsRef<[u8]>,
        value: Option<&[u8]>,
        including: bool,
        wire: &[u8],
    ) -> Result<bool> {
        Ok(verify_wire::<H, C>(
            expected_root,
            key.as_ref(),
            value,
            including,
            wire,
        )?)
    }
}

/// Split a batch into per-version results.
fn split_results(batch: &TreeUpdateBatch) -> Vec<CommitResult> {
    batch
        .root_hashes
        .iter()
        .map(|(version, root_hash)| CommitResult {
            version: *version,
            root_hash: *root_hash,
            nodes: batch
                .nodes
                .iter()
                .filter(|(key, _)| key.version() == *version)
                .map(|(key, node)| (key.clone(), node.clone()))
                .collect(),
            stale_nodes: batch
                .stale_node_index_batch
                .iter()
                .filter(|index| index.stale_since_version == *version)
                .map(|index| index.node_key.clone())
                .collect(),
            value_operations: batch
                .value_operations
                .iter()
                .filter(|(v, _)| v == version)
                .map(|(_, op)| op.clone())
                .collect(),
        })
        .collect()
}
