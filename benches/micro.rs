//! Micro-benchmarks for core engine operations.
//!
//! Uses Criterion for statistically rigorous measurement.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::hint::black_box;

use stratadb::{Engine, Options, ReadOptions, WriteBatch, WriteOptions};
use tempfile::TempDir;

/// Default value payload (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// Open a database with a large write buffer so everything stays in the
/// memtable (no background flushes).
fn open_memtable_only(dir: &std::path::Path) -> Engine {
    Engine::open(
        Options {
            create_if_missing: true,
            write_buffer_size: 256 * 1024 * 1024,
            ..Default::default()
        },
        dir,
    )
    .expect("open")
}

/// Open a database with a small write buffer so flushes happen during
/// sustained writes.
fn open_small_buffer(dir: &std::path::Path) -> Engine {
    Engine::open(
        Options {
            create_if_missing: true,
            write_buffer_size: 64 * 1024,
            ..Default::default()
        },
        dir,
    )
    .expect("open")
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Bytes(VALUE_128B.len() as u64));

    group.bench_function("memtable_128b", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_memtable_only(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            db.put(WriteOptions::default(), &make_key(i), VALUE_128B)
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("with_flushes_128b", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_small_buffer(dir.path());
        let mut i = 0u64;
        b.iter(|| {
            db.put(WriteOptions::default(), &make_key(i), VALUE_128B)
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn bench_batch_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_batch");
    group.throughput(Throughput::Elements(100));

    group.bench_function("100_records", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_memtable_only(dir.path());
        let mut round = 0u64;
        b.iter_batched(
            || {
                let mut batch = WriteBatch::new();
                for i in 0..100 {
                    batch.put(&make_key(round * 100 + i), VALUE_128B);
                }
                round += 1;
                batch
            },
            |batch| db.write(WriteOptions::default(), batch).unwrap(),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    group.bench_function("memtable_hit", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_memtable_only(dir.path());
        for i in 0..10_000 {
            db.put(WriteOptions::default(), &make_key(i), VALUE_128B)
                .unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 10_000);
            black_box(db.get(ReadOptions::default(), &key).unwrap());
            i += 1;
        });
    });

    group.bench_function("table_hit", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_small_buffer(dir.path());
        for i in 0..10_000 {
            db.put(WriteOptions::default(), &make_key(i), VALUE_128B)
                .unwrap();
        }
        db.compact_range(None, None).unwrap();
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 10_000);
            black_box(db.get(ReadOptions::default(), &key).unwrap());
            i += 1;
        });
    });

    group.bench_function("miss", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_small_buffer(dir.path());
        for i in 0..10_000 {
            db.put(WriteOptions::default(), &make_key(i), VALUE_128B)
                .unwrap();
        }
        db.compact_range(None, None).unwrap();
        b.iter(|| {
            black_box(db.get(ReadOptions::default(), b"absent-key").unwrap());
        });
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("full_10k", |b| {
        let dir = TempDir::new().unwrap();
        let db = open_small_buffer(dir.path());
        for i in 0..10_000 {
            db.put(WriteOptions::default(), &make_key(i), VALUE_128B)
                .unwrap();
        }
        db.compact_range(None, None).unwrap();
        b.iter(|| {
            let mut iter = db.iter(ReadOptions::default());
            iter.seek_to_first();
            let mut count = 0u64;
            while iter.valid() {
                black_box(iter.value());
                count += 1;
                iter.next();
            }
            assert_eq!(count, 10_000);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_batch_write, bench_get, bench_scan);
criterion_main!(benches);
