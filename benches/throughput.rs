//! Throughput Benchmark for linekv
//!
//! Measures the storage engine, the line parser and snapshot writing
//! under various workloads.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use linekv::persistence::PersistenceManager;
use linekv::protocol::{parse_command, LineParser};
use linekv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(format!("key:{}", i), "small_value".to_string());
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = "x".repeat(1024); // 1KB value
        b.iter(|| {
            engine.set(format!("key:{}", i), value.clone());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        engine.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..10_000 {
        engine.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                engine.set(format!("new:{}", i), "value".to_string());
            } else {
                black_box(engine.get(&format!("key:{}", i % 10_000)));
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            engine.set(key.clone(), "value".to_string());
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set_with_ttl(
                format!("key:{}", i),
                "value".to_string(),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.bench_function("expire_existing", |b| {
        for i in 0..10_000 {
            engine.set(format!("expire:{}", i), "value".to_string());
        }

        let mut i = 0u64;
        b.iter(|| {
            engine.expire(&format!("expire:{}", i % 10_000), Duration::from_secs(3600));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark KEYS over a populated store
fn bench_keys(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..3_000 {
        engine.set(format!("user:{}", i), "user_data".to_string());
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_sorted_3000", |b| {
        b.iter(|| {
            black_box(engine.keys());
        });
    });

    group.finish();
}

/// Benchmark line framing and command parsing
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_command_set", |b| {
        b.iter(|| {
            black_box(parse_command(black_box("SET session:42 payload 30")).unwrap());
        });
    });

    group.bench_function("line_parser_pipelined", |b| {
        let input = "GET key:1\n".repeat(64);
        b.iter(|| {
            let mut parser = LineParser::new();
            let mut buf = input.as_bytes();
            while let Some((frame, consumed)) = parser.parse(buf) {
                black_box(frame);
                buf = &buf[consumed..];
            }
        });
    });

    group.finish();
}

/// Benchmark SAVE of a populated store
fn bench_snapshot(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = Arc::new(StorageEngine::new());
    let persistence = PersistenceManager::new(Arc::clone(&engine), dir.path().join("bench.json"));

    for i in 0..10_000 {
        engine.set(format!("key:{}", i), format!("value:{}", i));
    }

    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);

    group.bench_function("save_10000", |b| {
        b.iter(|| {
            black_box(persistence.save().unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_expiry,
    bench_keys,
    bench_parse,
    bench_snapshot,
);

criterion_main!(benches);
