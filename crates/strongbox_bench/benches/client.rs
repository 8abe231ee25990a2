//! Client operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strongbox_bench::{bench_schema, generate_users, random_user};
use strongbox_core::query::{
    CreateArgs, CreateManyArgs, Filter, FindManyArgs, FindUniqueArgs, OperationArgs,
};
use strongbox_core::{Client, EncryptionMode};
use strongbox_storage::InMemoryBackend;
use tokio::runtime::Runtime;

fn client(rt: &Runtime, seed: usize) -> Client {
    let client = Client::with_backend(
        bench_schema(),
        Arc::new(InMemoryBackend::new()),
        &EncryptionMode::Generated,
    )
    .unwrap();
    if seed > 0 {
        rt.block_on(client.create_many("User", CreateManyArgs::new(generate_users(seed))))
            .unwrap();
    }
    client
}

/// Benchmark `create` into collections of growing size.
fn bench_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("client_create");
    group.sample_size(20);

    for seed in [0, 1_000].iter() {
        let client = client(&rt, *seed);
        let next = AtomicUsize::new(seed + 1);
        group.bench_with_input(BenchmarkId::from_parameter(seed), seed, |b, _| {
            b.to_async(&rt).iter(|| async {
                let user = random_user(next.fetch_add(1, Ordering::Relaxed));
                black_box(client.create("User", CreateArgs::new(user)).await.unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark cached reads.
fn bench_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("client_read");
    let client = client(&rt, 5_000);
    let page = FindManyArgs::from_json(json!({
        "where": {"age": {"gte": 18}},
        "orderBy": {"age": "asc"},
        "take": 50
    }))
    .unwrap();

    group.bench_function("find_many_page", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(client.find_many("User", page.clone()).await.unwrap());
        });
    });
    group.bench_function("find_unique_by_id", |b| {
        b.to_async(&rt).iter(|| async {
            let args = FindUniqueArgs::new(Filter::equals("id", "u2500"));
            black_box(client.find_unique("User", args).await.unwrap());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_create, bench_reads);
criterion_main!(benches);
