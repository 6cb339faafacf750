mod common;

use common::{key, key_hash, tree, value};
use jellyfish::{
    Blake3Hasher, ClassicCommitment, CommitmentScheme, Error, HashFunction, InMemoryStore,
    JellyfishMerkleTree, LeafNode, Options,
};

type Classic = ClassicCommitment<Blake3Hasher>;

#[test]
fn put_then_get_1000() {
    let mut t = tree();
    let updates: Vec<_> = (0..1000).map(|i| (key(i), value(i, 1))).collect();
    let committed = t.put(1, updates).unwrap();

    assert_eq!(committed.version, 1);
    assert_eq!(t.root_hash(1).unwrap(), Some(committed.root_hash));
    assert_eq!(t.latest_version().unwrap(), Some(1));
    for i in 0..1000 {
        assert_eq!(t.get(key(i)).unwrap(), Some(value(i, 1)));
    }
    assert_eq!(t.get(key(1000)).unwrap(), None);

    let snapshot = t.metrics().snapshot().unwrap();
    assert_eq!(snapshot.commits, 1);
    assert_eq!(snapshot.value_reads, 1001);
    assert_eq!(snapshot.value_read_misses, 1);
    assert_eq!(snapshot.nodes_written, committed.nodes.len() as u64);
}

#[test]
fn single_key_root_is_its_leaf() {
    let mut t = tree();
    let root = t.put(1, [(b"alice", b"1")]).unwrap().root_hash;

    let leaf = LeafNode::new(key_hash(b"alice"), Blake3Hasher::digest(b"1"));
    assert_eq!(root, leaf.hash::<Classic>(0));
}

#[test]
fn versions_keep_their_history() {
    let mut t = tree();
    let mut roots = Vec::new();
    for version in 1..=5u64 {
        let updates: Vec<_> = (0..50).map(|i| (key(i), value(i, version))).collect();
        roots.push(t.put(version, updates).unwrap().root_hash);
    }

    // every version has a distinct root, and old values stay readable.
    for (i, root) in roots.iter().enumerate() {
        let version = i as u64 + 1;
        assert_eq!(t.root_hash(version).unwrap(), Some(*root));
        assert!(roots[..i].iter().all(|r| r != root));
        for k in [0, 17, 49] {
            assert_eq!(t.get_at(key(k), version).unwrap(), Some(value(k, version)));
        }
    }
    assert_eq!(t.get_at(key(0), 0).unwrap(), None);
    assert_eq!(t.get(key(0)).unwrap(), Some(value(0, 5)));
}

#[test]
fn root_is_independent_of_insertion_order() {
    let updates: Vec<_> = (0..200).map(|i| (key(i), value(i, 1))).collect();
    let mut reversed = updates.clone();
    reversed.reverse();

    let mut a = tree();
    let mut b = tree();
    let root_a = a.put(1, updates.clone()).unwrap().root_hash;
    let root_b = b.put(1, reversed).unwrap().root_hash;
    assert_eq!(root_a, root_b);

    // the same content built over several versions lands on the same root as well.
    let mut c = tree();
    c.put(1, updates[..100].to_vec()).unwrap();
    let root_c = c.put(2, updates[100..].to_vec()).unwrap().root_hash;
    assert_eq!(root_a, root_c);
}

#[test]
fn last_duplicate_wins() {
    let mut t = tree();
    t.put(1, [(key(1), b"first".to_vec()), (key(1), b"second".to_vec())])
        .unwrap();
    assert_eq!(t.get(key(1)).unwrap(), Some(b"second".to_vec()));

    let mut u = tree();
    let expected = u.put(1, [(key(1), b"second".to_vec())]).unwrap().root_hash;
    assert_eq!(t.root_hash(1).unwrap(), Some(expected));
}

#[test]
fn versions_must_increase() {
    let mut t = tree();
    t.put(3, [(key(1), value(1, 3))]).unwrap();

    for bad in [0, 3] {
        assert!(matches!(
            t.put(bad, [(key(2), value(2, bad))]),
            Err(Error::NonMonotonicVersion {
                latest: 3,
                requested
            }) if requested == bad
        ));
    }

    // gaps are fine.
    t.put(10, [(key(2), value(2, 10))]).unwrap();
    assert_eq!(t.latest_version().unwrap(), Some(10));
    assert_eq!(t.root_hash(5).unwrap(), None);
}

#[test]
fn empty_update_keeps_root() {
    let mut t = tree();
    let empty = t.put(1, Vec::<(Vec<u8>, Vec<u8>)>::new()).unwrap();
    assert_eq!(empty.root_hash, Classic::null_hash());
    assert!(empty.nodes.is_empty());

    let root = t.put(2, [(key(1), value(1, 2))]).unwrap().root_hash;
    let same = t.put(3, Vec::<(Vec<u8>, Vec<u8>)>::new()).unwrap();
    assert_eq!(same.root_hash, root);
    assert_eq!(t.root_hash(3).unwrap(), Some(root));
    assert_eq!(t.get_at(key(1), 3).unwrap(), Some(value(1, 2)));
}

#[test]
fn readers_share_the_store() {
    let store = std::sync::Arc::new(InMemoryStore::new());
    let mut writer = JellyfishMerkleTree::<_>::new(store.clone(), Options::new());
    let reader = JellyfishMerkleTree::<_>::new(store, Options::new());

    writer.put(1, [(key(1), value(1, 1))]).unwrap();
    assert_eq!(reader.get(key(1)).unwrap(), Some(value(1, 1)));
    assert_eq!(reader.latest_version().unwrap(), Some(1));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let store = reader.store().clone();
            std::thread::spawn(move || {
                let t = JellyfishMerkleTree::<_>::new(store, Options::new());
                t.get_proof(key(1), 1).unwrap().unwrap().is_inclusion()
            })
        })
        .collect();
    for thread in threads {
        assert!(thread.join().unwrap());
    }
}

#[test]
fn quickcheck_history_matches_model() {
    use quickcheck::{QuickCheck, TestResult};
    use std::collections::BTreeMap;

    fn prop(batches: Vec<Vec<(u8, u8)>>) -> TestResult {
        if batches.is_empty() || batches.len() > 8 {
            return TestResult::discard();
        }
        let mut t = tree();
        let mut models = Vec::new();
        let mut model = BTreeMap::new();
        for (i, batch) in batches.iter().enumerate() {
            let version = i as u64 + 1;
            let updates: Vec<_> = batch
                .iter()
                .map(|(k, v)| (key(*k as u64), vec![*v]))
                .collect();
            t.put(version, updates.clone()).unwrap();
            model.extend(updates);
            models.push(model.clone());
        }

        for (i, model) in models.iter().enumerate() {
            let version = i as u64 + 1;
            for k in 0..=255u8 {
                let k = key(k as u64);
                if t.get_at(&k, version).unwrap().as_ref() != model.get(&k) {
                    return TestResult::failed();
                }
            }
        }
        TestResult::passed()
    }

    QuickCheck::new()
        .tests(30)
        .quickcheck(prop as fn(Vec<Vec<(u8, u8)>>) -> TestResult);
}
