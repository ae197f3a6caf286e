use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use graft_prolly_tree::{AdvancedNodeBuilder, Chunker, Segment};
use graft_storage::MemoryChunkStore;
use rand::{rngs::StdRng, Rng, SeedableRng};

const BENCH_SEED: u64 = 42;

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn bench_blob_splice(c: &mut Criterion) {
    let mut group = c.benchmark_group("blob_splice");

    for size in [16 * 1024, 64 * 1024, 256 * 1024] {
        let data = random_bytes(BENCH_SEED, size);
        let patch = random_bytes(BENCH_SEED + 1, 1024);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(tokio::runtime::Runtime::new().unwrap()).iter(|| {
                let data = data.clone();
                let patch = patch.clone();
                async move {
                    let store = MemoryChunkStore::new();
                    let root = AdvancedNodeBuilder::fresh(&store, &store)
                        .insert(0, vec![Segment::fixed(&data[..])])
                        .commit(Chunker::Blob)
                        .await
                        .unwrap();
                    AdvancedNodeBuilder::from_root(root, &store, &store)
                        .splice((data.len() / 2) as u64, 512, vec![Segment::fixed(&patch[..])])
                        .commit(Chunker::Blob)
                        .await
                        .unwrap()
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_blob_splice);
criterion_main!(benches);
