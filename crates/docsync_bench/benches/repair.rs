//! Repair cycle benchmarks.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use docsync_bench::{generate_documents, BenchPair};

/// Benchmark a first repair copying every local document.
fn bench_initial_repair(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_repair");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        let docs = generate_documents(*count, 8);
        group.throughput(Throughput::Elements(*count as u64));
        for workers in [1, 4] {
            group.bench_with_input(
                BenchmarkId::new(format!("workers_{workers}"), count),
                &docs,
                |b, docs| {
                    b.iter_batched(
                        || {
                            let pair = BenchPair::new(workers).unwrap();
                            pair.seed_local(docs).unwrap();
                            pair
                        },
                        |pair| {
                            let report = pair.storage.repair().unwrap();
                            assert_eq!(report.documents_propagated, docs.len());
                            pair
                        },
                        BatchSize::LargeInput,
                    );
                },
            );
        }
    }
    group.finish();
}

/// Benchmark a repair with nothing to do.
fn bench_idle_repair(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_repair");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let pair = BenchPair::new(1).unwrap();
            pair.seed_local(&generate_documents(count, 8)).unwrap();
            pair.storage.repair().unwrap();

            b.iter(|| {
                let report = pair.storage.repair().unwrap();
                assert!(report.is_noop());
            });
        });
    }
    group.finish();
}

/// Benchmark a repair pulling remote edits through bulk fetches.
fn bench_remote_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_edits");
    group.sample_size(20);

    let count = 500;
    let docs = generate_documents(count, 8);
    group.throughput(Throughput::Elements(count as u64));
    group.bench_function("bulk", |b| {
        b.iter_batched(
            || {
                let pair = BenchPair::new(1).unwrap();
                pair.seed_local(&docs).unwrap();
                pair.storage.repair().unwrap();
                for (id, doc) in &docs {
                    let mut doc = doc.clone();
                    doc.insert("edited".to_string(), serde_json::Value::Bool(true));
                    docsync_storage::DocumentStorage::put(&*pair.remote, id, doc).unwrap();
                }
                pair
            },
            |pair| pair.storage.repair().unwrap(),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_initial_repair,
    bench_idle_repair,
    bench_remote_edits
);
criterion_main!(benches);
