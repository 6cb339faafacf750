//! Core types and proof verification for the Jellyfish Merkle Tree.
//!
//! This crate defines the node model of the tree, its commitment scheme and the wire format of
//! its proofs in a storage-agnostic manner. Light clients can verify proofs with nothing but this
//! crate.
//!
//! The core types and proof verification routines of this crate do not require the
//! standard library, but do require Rust's alloc crate.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

pub mod cbor;
pub mod hasher;
pub mod nibble;
pub mod node;
pub mod node_key;
pub mod proof;

pub use hasher::{ClassicCommitment, CommitmentScheme, HashFunction};
pub use nibble::{NibblePath, EMPTY_PATH};
pub use node::{Hash, InternalNode, KeyHash, LeafNode, Node, NodeTag, ValueHash};
pub use node_key::{NodeKey, Version};
pub use proof::{BranchStep, JmtProof, Neighbor, ProofError, VerifiedProof};
