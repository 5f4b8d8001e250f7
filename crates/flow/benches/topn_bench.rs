//! Benchmarks for Top-N ranking

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flow::operator::{CollectSink, SliceSource};
use flow::topn::{hash_key, Order, RankedList, TopNOptions, Tuple};
use flow::{Flow, Record};
use tokio::runtime::Runtime;

const RECORDS: usize = 10_000;

/// Pseudo-random but reproducible sort keys
fn values() -> Vec<i64> {
    (0..RECORDS as i64).map(|i| (i * 7_919) % 10_007).collect()
}

fn bench_ranked_list_offer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranked_list_offer");
    group.throughput(Throughput::Elements(RECORDS as u64));
    let values = values();

    for n in [3usize, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut list = RankedList::new(n, Order::Desc);
                for &v in &values {
                    list.offer(Tuple::new(v, Record::without_ts(v)));
                }
                black_box(list.len())
            });
        });
    }

    group.finish();
}

fn bench_rank_grouped_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_grouped_batch");
    group.throughput(Throughput::Elements(RECORDS as u64));

    let ranker = TopNOptions::new()
        .with_key_extractor(|r: &Record<(u32, i64)>| format!("instance-{}", r.data().1 % 500))
        .with_sort_key_extractor(|r: &Record<(u32, i64)>| r.data().1)
        .with_group_key_extractor(|r: &Record<(u32, i64)>| format!("service-{}", r.data().0))
        .order_by(Order::Asc)
        .ranker(10)
        .unwrap();

    let batch: Vec<Record<(u32, i64)>> = values()
        .into_iter()
        .enumerate()
        .map(|(i, v)| Record::new(((i % 16) as u32, v), i as i64))
        .collect();

    group.bench_function("16_groups_top_10", |b| {
        b.iter(|| black_box(ranker.rank(batch.clone()).len()));
    });

    group.finish();
}

fn bench_hash_key(c: &mut Criterion) {
    c.bench_function("hash_key", |b| {
        b.iter(|| black_box(hash_key(black_box("e2e-service-consumerinstance-001"))));
    });
}

fn bench_pipeline_top_n(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_top_n");
    group.throughput(Throughput::Elements(RECORDS as u64));

    group.bench_function("single_batch", |b| {
        b.to_async(&rt).iter(|| async {
            let sink = CollectSink::new();
            let collected = sink.handle();
            let batch: Vec<Record<i64>> = values().into_iter().map(Record::without_ts).collect();

            let mut pipeline = Flow::new("bench", SliceSource::new(vec![batch]))
                .top_n(
                    10,
                    TopNOptions::new().with_sort_key_extractor(|r: &Record<i64>| *r.data()),
                )
                .to(sink);

            pipeline.open().await.unwrap();
            while collected.is_empty() {
                tokio::task::yield_now().await;
            }
            pipeline.close().await.unwrap();
            black_box(collected.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ranked_list_offer,
    bench_rank_grouped_batch,
    bench_hash_key,
    bench_pipeline_top_n
);
criterion_main!(benches);
