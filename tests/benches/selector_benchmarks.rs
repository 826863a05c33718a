//! # Block Assembly Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | Package selection | O(n log n) in pool size |
//! | Pool snapshot | ancestor closure per candidate |
//! | Header hashing | one midstate clone per nonce |

use assembly_tests::fixtures::{chain_at, random_pool, REGTEST_BITS, TIP_HEIGHT, TIP_MTP};
use block_assembly::adapters::InMemoryPoolSnapshot;
use block_assembly::domain::{
    BlockHeader, ChainContext, NonceRange, PuzzleHashState, PuzzleHeaderPreimage,
};
use block_assembly::AssemblerConfig;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use primitive_types::{H256, U256};
use std::time::Duration;

fn bench_package_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("package-selection");
    group.measurement_time(Duration::from_secs(10));

    let mut config = AssemblerConfig::default();
    config.selector.block_min_fee_rate = 0;
    let selector = config.package_selector();
    let chain = chain_at(TIP_HEIGHT);

    for size in [100u64, 1_000, 5_000] {
        let pool = InMemoryPoolSnapshot::new(random_pool(size, 0)).expect("acyclic pool");
        let context = ChainContext {
            tip: chain.tip().clone(),
            block_time: TIP_MTP + 600,
        };

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("select", size), &pool, |b, pool| {
            b.iter(|| {
                let report = selector
                    .select(pool, &chain, context.clone())
                    .expect("selection succeeds");
                black_box(report.considered)
            })
        });
    }

    group.finish();
}

fn bench_pool_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool-snapshot");

    for size in [1_000u64, 5_000] {
        let txs = random_pool(size, 0);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("build", size), &txs, |b, txs| {
            b.iter(|| black_box(InMemoryPoolSnapshot::new(txs.clone()).expect("acyclic pool")))
        });
    }

    group.finish();
}

fn bench_header_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("header-hashing");

    let header = BlockHeader {
        version: 4,
        prev_hash: H256::repeat_byte(0x11),
        merkle_root: H256::repeat_byte(0x22),
        reserved: H256::zero(),
        time: 1_700_000_600,
        bits: REGTEST_BITS,
        nonce: H256::zero(),
        solution: Vec::new(),
    };
    let midstate = PuzzleHeaderPreimage::from_header(&header).midstate();

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("midstate_1000_nonces", |b| {
        b.iter(|| {
            let range = NonceRange::new(U256::zero(), U256::from(999u64));
            let mut nonce = range.start;
            while nonce <= range.end {
                let state = PuzzleHashState::new(&midstate, nonce);
                black_box(state.header_hash(&[]));
                nonce += U256::one();
            }
        })
    });

    group.bench_function("full_header_hash", |b| b.iter(|| black_box(header.hash())));

    group.finish();
}

criterion_group!(
    benches,
    bench_package_selection,
    bench_pool_snapshot,
    bench_header_hashing
);
criterion_main!(benches);
