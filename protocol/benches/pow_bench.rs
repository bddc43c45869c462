// Ledger benchmarks.
//
// Covers nonce search at the low difficulties a small network runs at,
// Merkle commitment over review batches, and loading a chain snapshot.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use reviewchain_protocol::crypto::Hash32;
use reviewchain_protocol::ledger::{merkle_root, pow, Block, Blockchain, Review, ReviewEnvelope};

fn review(i: usize) -> Review {
    Review {
        user: format!("user-{i}"),
        subject: "lighthouse bakery".into(),
        rating: (i % 6) as f64,
        body: format!("visit number {i}, bread was fine"),
        time: 1_700_000_000 + i as u64,
    }
}

fn candidate(prev: &Block, reviews: Vec<Review>, difficulty: u32) -> Block {
    let envelope = ReviewEnvelope::new(reviews);
    let mut merkle: Hash32 = [0u8; 32];
    merkle.copy_from_slice(&envelope.merkle_root().unwrap());
    Block::new(
        prev.id + 1,
        1_700_000_000,
        difficulty,
        merkle,
        *prev.hash().unwrap(),
        envelope.encode().unwrap(),
    )
}

fn build_chain(len: usize, difficulty: u32) -> Blockchain {
    let mut chain = Blockchain::with_genesis();
    for i in 0..len {
        let mut block = candidate(chain.tip().unwrap(), vec![review(i)], difficulty);
        let hash = pow::mine(&mut block).unwrap();
        chain.add_block(block, hash).unwrap();
    }
    chain
}

fn bench_mine(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow/mine");
    let genesis = Block::genesis();

    for difficulty in [1u32, 2, 3] {
        group.bench_with_input(BenchmarkId::from_parameter(difficulty), &difficulty, |b, &d| {
            b.iter_with_setup(
                || candidate(&genesis, vec![review(0)], d),
                |mut block| pow::mine(&mut block).unwrap(),
            );
        });
    }

    group.finish();
}

fn bench_merkle_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle/root");

    for n in [1usize, 16, 256] {
        let leaves: Vec<Vec<u8>> = (0..n).map(|i| review(i).canonical_bytes().unwrap()).collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &leaves, |b, leaves| {
            b.iter(|| merkle_root(leaves));
        });
    }

    group.finish();
}

fn bench_chain_from_json(c: &mut Criterion) {
    let chain = build_chain(64, 1);
    let json = chain.to_json().unwrap();

    c.bench_function("chain/from_json_64", |b| {
        b.iter(|| Blockchain::from_json(json.as_bytes()).unwrap());
    });
}

criterion_group!(benches, bench_mine, bench_merkle_root, bench_chain_from_json);
criterion_main!(benches);
