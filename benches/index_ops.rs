//! Benchmarks for index operations against the in-memory feed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dfs_index::{Index, IndexType, Owner, Storage, WriteMode};

fn generate_url_like_keys(n: usize) -> Vec<String> {
    let domains = ["example.com", "test.org", "demo.net", "sample.io"];
    let paths = ["users", "posts", "comments", "api/v1", "api/v2"];

    (0..n)
        .map(|i| {
            let domain = domains[i % domains.len()];
            let path = paths[(i / domains.len()) % paths.len()];
            let id = i / (domains.len() * paths.len());
            format!("{domain}/{path}/{id}")
        })
        .collect()
}

fn new_index(index_type: IndexType) -> Index {
    Index::create(Storage::in_memory(), Owner::new("bench"), "bench", "keys", index_type).unwrap()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100, 1_000] {
        let keys = generate_url_like_keys(size);

        group.bench_with_input(BenchmarkId::new("put", size), &keys, |b, keys| {
            b.iter(|| {
                let mut index = new_index(IndexType::String);
                for (i, key) in keys.iter().enumerate() {
                    index.put(key, i.to_le_bytes().to_vec(), WriteMode::Replace).unwrap();
                }
                black_box(index)
            });
        });

        group.bench_with_input(BenchmarkId::new("batch", size), &keys, |b, keys| {
            b.iter(|| {
                let mut index = new_index(IndexType::String);
                let mut batch = index.batch(WriteMode::Replace).unwrap();
                for (i, key) in keys.iter().enumerate() {
                    batch.put(key, i.to_le_bytes().to_vec()).unwrap();
                }
                black_box(batch.write().unwrap());
                black_box(index)
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [100, 1_000] {
        let keys = generate_url_like_keys(size);
        let mut index = new_index(IndexType::String);
        let mut batch = index.batch(WriteMode::Replace).unwrap();
        for (i, key) in keys.iter().enumerate() {
            batch.put(key, i.to_le_bytes().to_vec()).unwrap();
        }
        batch.write().unwrap();

        group.bench_with_input(BenchmarkId::new("get", size), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    black_box(index.get(key).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for size in [100, 1_000] {
        let mut index = new_index(IndexType::Number);
        let mut batch = index.batch(WriteMode::Replace).unwrap();
        for i in 0..size as i64 {
            batch.put_number(i, i.to_le_bytes().to_vec()).unwrap();
        }
        batch.write().unwrap();

        group.bench_function(BenchmarkId::new("full", size), |b| {
            b.iter(|| {
                let mut it = index.iter("", None, None).unwrap();
                let mut n = 0;
                while it.advance().unwrap() {
                    n += 1;
                }
                black_box(n)
            });
        });

        group.bench_function(BenchmarkId::new("range_10", size), |b| {
            b.iter(|| {
                let mut it = index.int_iter(size as i64 / 2, None, Some(10)).unwrap();
                let mut n = 0;
                while it.advance().unwrap() {
                    n += 1;
                }
                black_box(n)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_iterate);
criterion_main!(benches);
