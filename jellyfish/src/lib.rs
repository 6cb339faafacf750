//! A versioned, authenticated key-value map built on the Jellyfish Merkle Tree.
//!
//! Every committed version has its own root hash, and every version stays readable and provable
//! until an external collector removes the nodes which went stale before it. Keys and values are
//! arbitrary bytes; the tree works over their hashes. Persistence is pluggable through [`Store`],
//! with [`InMemoryStore`] provided.
//!
//! ```ignore
//! let mut tree = JellyfishMerkleTree::<_>::new(InMemoryStore::new(), Options::new());
//! let committed = tree.put(1, [(b"alice", b"1")])?;
//! let wire = tree.get_proof_wire(b"alice", 1)?.unwrap();
//! assert!(tree.verify_proof_wire(&committed.root_hash, b"alice", Some(b"1"), true, &wire)?);
//! ```

pub use jellyfish_core::{
    hasher, proof, ClassicCommitment, CommitmentScheme, Hash, HashFunction, InternalNode, JmtProof,
    KeyHash, LeafNode, NibblePath, Node, NodeKey, ProofError, ValueHash, Version,
};

#[cfg(feature = "sha2-hasher")]
pub use jellyfish_core::hasher::Sha2Hasher;
pub use jellyfish_core::hasher::Blake3Hasher;

pub use error::{Error, Result};
pub use metrics::{Metric, Metrics, MetricsSnapshot};
pub use options::Options;
pub use store::{CommitBatch, CommitConfig, InMemoryStore, NodeEntry, StaleNodeIndex, Store};
pub use tree::{CommitResult, JellyfishMerkleTree};
pub use tree_cache::{NodeStats, TreeUpdateBatch, ValueOperation};

mod error;
mod metrics;
mod options;
pub mod store;
mod tree;
mod tree_cache;
