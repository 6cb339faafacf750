#![cfg(feature = "sha2-hasher")]

mod common;

use hex_literal::hex;
use jellyfish::{InMemoryStore, JellyfishMerkleTree, Options, Sha2Hasher};

type Sha2Tree = JellyfishMerkleTree<InMemoryStore, Sha2Hasher>;

fn sha2_tree() -> Sha2Tree {
    common::init_tracing();
    Sha2Tree::new(InMemoryStore::new(), Options::new())
}

#[test]
fn single_leaf_root() {
    let mut t = sha2_tree();
    let root = t.put(1, [(b"alice", b"1")]).unwrap().root_hash;
    assert_eq!(
        root,
        hex!("56b3f282d4d76a1990d8c9c6c97f4e8133974b7cb2d481d345a8baf65a76fba3")
    );
}

#[test]
fn roots_across_versions() {
    let expected_roots = [
        hex!("63379ce7891fd7032e46bdec355cd6724450dbf63090181937a5a9d911aa0207"),
        hex!("a97478bb81a23ce8b1a8de943a462b1629b7889e382ad2be346adf6f5394b613"),
    ];

    let mut t = sha2_tree();
    let v1 = t
        .put(1, [(b"alice".to_vec(), b"1".to_vec()), (b"bob".to_vec(), b"2".to_vec())])
        .unwrap();
    let v2 = t.put(2, [(b"carol", b"3")]).unwrap();
    assert_eq!(v1.root_hash, expected_roots[0]);
    assert_eq!(v2.root_hash, expected_roots[1]);

    let wire = t.get_proof_wire(b"bob", 2).unwrap().unwrap();
    assert!(t
        .verify_proof_wire(&expected_roots[1], b"bob", Some(b"2"), true, &wire)
        .unwrap());
}
