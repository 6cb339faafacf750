#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use jellyfish::{InMemoryStore, JellyfishMerkleTree, Options};

fuzz_target!(|run: Run| {
    let mut tree = JellyfishMerkleTree::<_>::new(InMemoryStore::new(), Options::new());
    let mut model: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    let mut version = 0u64;

    for call in run.calls {
        match call {
            TreeCall::Put { gap, writes } => {
                version += 1 + gap as u64;
                let writes: Vec<_> = writes.into_iter().map(|(k, v)| ([k], v)).collect();
                let root = tree.put(version, writes.clone()).unwrap().root_hash;
                for ([k], v) in writes {
                    model.insert(k, v);
                }
                assert_eq!(tree.root_hash(version).unwrap(), Some(root));
            }
            TreeCall::Get { key } => {
                assert_eq!(tree.get([key]).unwrap().as_ref(), model.get(&key));
            }
            TreeCall::Prove { key } => {
                let Some(root) = tree.root_hash(version).unwrap() else {
                    assert_eq!(tree.get_proof([key], version).unwrap(), None);
                    continue;
                };
                let wire = tree.get_proof_wire([key], version).unwrap().unwrap();
                let value = model.get(&key);
                assert!(tree
                    .verify_proof_wire(
                        &root,
                        [key],
                        value.map(|v| &v[..]),
                        value.is_some(),
                        &wire
                    )
                    .unwrap());
            }
            TreeCall::Reject { version: v } => {
                if v as u64 <= version && version > 0 {
                    assert!(tree.put(v as u64, [([0u8], [0u8])]).is_err());
                }
            }
        }
    }
});

#[derive(Debug, Arbitrary)]
struct Run {
    calls: Vec<TreeCall>,
}

#[derive(Debug, Arbitrary)]
enum TreeCall {
    /// Commit the writes at the next version, skipping `gap` versions.
    Put { gap: u8, writes: Vec<(u8, Vec<u8>)> },
    Get { key: u8 },
    /// Prove the key at the latest version and check the proof against the model.
    Prove { key: u8 },
    /// Attempt a write at a version which is not newer than the latest.
    Reject { version: u8 },
}
