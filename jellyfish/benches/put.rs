#[cfg(feature = "benchmarks")]
use criterion::{criterion_group, criterion_main};

#[cfg(feature = "benchmarks")]
mod tree_benches {
    use criterion::{BenchmarkId, Criterion};
    use jellyfish::{InMemoryStore, JellyfishMerkleTree, Options};
    use rand::RngCore;

    fn random_updates(n: usize) -> Vec<([u8; 32], [u8; 32])> {
        let mut rand = rand::thread_rng();
        (0..n)
            .map(|_| {
                let mut k = [0; 32];
                let mut v = [0; 32];
                rand.fill_bytes(&mut k);
                rand.fill_bytes(&mut v);
                (k, v)
            })
            .collect()
    }

    pub fn put_benchmark(c: &mut Criterion) {
        let mut group = c.benchmark_group("put");

        for preload in [0, 10_000, 100_000] {
            group.bench_function(BenchmarkId::new("1000_keys_over", preload), |b| {
                b.iter_batched(
                    || {
                        let mut tree =
                            JellyfishMerkleTree::<_>::new(InMemoryStore::new(), Options::new());
                        if preload > 0 {
                            tree.put(1, random_updates(preload)).unwrap();
                        }
                        (tree, random_updates(1000))
                    },
                    |(mut tree, updates)| tree.put(2, updates).unwrap(),
                    criterion::BatchSize::LargeInput,
                )
            });
        }

        group.finish();
    }

    pub fn proof_benchmark(c: &mut Criterion) {
        let mut group = c.benchmark_group("prove");
        let mut tree = JellyfishMerkleTree::<_>::new(InMemoryStore::new(), Options::new());
        let updates = random_updates(100_000);
        let root = tree.put(1, updates.clone()).unwrap().root_hash;

        group.bench_function("get_proof_wire", |b| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % updates.len();
                tree.get_proof_wire(updates[i].0, 1).unwrap()
            })
        });

        let wire = tree.get_proof_wire(updates[0].0, 1).unwrap().unwrap();
        group.bench_function("verify_proof_wire", |b| {
            b.iter(|| {
                tree.verify_proof_wire(&root, updates[0].0, Some(&updates[0].1), true, &wire)
                    .unwrap()
            })
        });

        group.finish();
    }
}

#[cfg(feature = "benchmarks")]
criterion_group!(benches, tree_benches::put_benchmark, tree_benches::proof_benchmark);
#[cfg(feature = "benchmarks")]
criterion_main!(benches);

#[cfg(not(feature = "benchmarks"))]
fn main() {}
