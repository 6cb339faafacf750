#![allow(dead_code)]

use std::sync::Once;

use jellyfish::{Blake3Hasher, HashFunction, InMemoryStore, JellyfishMerkleTree, KeyHash, Options};

pub type Tree<S = InMemoryStore> = JellyfishMerkleTree<S>;

static INIT_TRACING: Once = Once::new();

/// Install a log subscriber for the test binary, honouring `RUST_LOG`.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn tree() -> Tree {
    init_tracing();
    let mut o = Options::new();
    o.metrics(true);
    Tree::new(InMemoryStore::new(), o)
}

/// A key derived from `id`.
pub fn key(id: u64) -> Vec<u8> {
    // keys only need to be distinct; the tree hashes them anyway.
    use rand::{RngCore as _, SeedableRng as _};
    let mut seed = [0; 16];
    seed[0..8].copy_from_slice(&id.to_le_bytes());
    let mut rng = rand_pcg::Lcg64Xsh32::from_seed(seed);
    let mut key = vec![0; 16];
    rng.fill_bytes(&mut key);
    key
}

pub fn value(id: u64, version: u64) -> Vec<u8> {
    format!("value-{id}-{version}").into_bytes()
}

pub fn key_hash(key: &[u8]) -> KeyHash {
    Blake3Hasher::digest(key)
}

/// Find `count` keys whose hashes share their first `shared` nibbles with each other but differ
/// at nibble `shared`.
pub fn keys_sharing_nibbles(shared: usize, count: usize) -> Vec<Vec<u8>> {
    let nibble = |h: &KeyHash, i: usize| (h[i / 2] >> (4 * (1 - i % 2))) & 0x0f;

    let first = key(0);
    let first_hash = key_hash(&first);
    let mut seen = vec![nibble(&first_hash, shared)];
    let mut keys = vec![first];

    let mut id = 1u64;
    while keys.len() < count {
        let candidate = key(id);
        let h = key_hash(&candidate);
        id += 1;
        if (0..shared).all(|i| nibble(&h, i) == nibble(&first_hash, i))
            && !seen.contains(&nibble(&h, shared))
        {
            seen.push(nibble(&h, shared));
            keys.push(candidate);
        }
    }
    keys
}
