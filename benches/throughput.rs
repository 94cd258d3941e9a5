//! Throughput Benchmark for cider
//!
//! Measures the store under various workloads, plus the per-line cost of
//! parsing a command and encoding its reply.

use bytes::Bytes;
use cider::protocol::{parse_command, Reply};
use cider::storage::{unix_now, ExpireFlags, Store};
use cider::CommandHandler;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set(format!("key:{}", i), Bytes::from("small_value"), None);
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            store.set(format!("key:{}", i), value.clone(), None);
            i += 1;
        });
    });

    group.bench_function("set_with_expiry", |b| {
        let mut i = 0u64;
        let at = unix_now() + 3600;
        b.iter(|| {
            store.set(format!("ttl:{}", i), Bytes::from("value"), Some(at));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    // Pre-populate with data
    for i in 0..100_000 {
        store.set(format!("key:{}", i), Bytes::from(format!("value:{}", i)), None);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            let _ = black_box(store.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            let _ = black_box(store.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark INCR operations
fn bench_incr(c: &mut Criterion) {
    let store = Arc::new(Store::new());
    store.set("counter", Bytes::from("0"), None);
    for i in 0..1000 {
        store.set(format!("counter:{}", i), Bytes::from("0"), None);
    }

    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    // Single counter (high contention)
    group.bench_function("single_counter", |b| {
        b.iter(|| {
            black_box(store.incr("counter").unwrap());
        });
    });

    // Multiple counters (low contention)
    group.bench_function("multiple_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("counter:{}", i % 1000);
            black_box(store.incr(&key).unwrap());
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

    group.bench_function("4_threads_shared_counter", |b| {
        b.iter(|| {
            let store = Arc::new(Store::new());
            store.set("counter", Bytes::from("0"), None);

            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            store.set(key.as_str(), Bytes::from("value"), None);
                            let _ = store.get(&key);
                            let _ = store.incr("counter");
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

/// Benchmark EXPIRE operations
fn bench_expire(c: &mut Criterion) {
    let store = Arc::new(Store::new());
    for i in 0..10_000 {
        store.set(format!("expire:{}", i), Bytes::from("value"), None);
    }

    let mut group = c.benchmark_group("expire");
    group.throughput(Throughput::Elements(1));

    group.bench_function("expire_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("expire:{}", i % 10_000);
            black_box(store.expire(&key, 3600, ExpireFlags::default()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark the line protocol: parse, execute and encode
fn bench_protocol(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_set_with_modifiers", |b| {
        b.iter(|| black_box(parse_command(black_box(b"SET session:42 some value XX GET EX 60"))));
    });

    group.bench_function("encode_bulk_reply", |b| {
        let reply = Reply::bulk(Bytes::from("x".repeat(128)));
        b.iter(|| black_box(reply.serialize()));
    });

    let handler = CommandHandler::new(Arc::new(Store::new()));
    handler.execute(b"SET hot value");
    group.bench_function("execute_get", |b| {
        b.iter(|| black_box(handler.execute(b"GET hot").serialize()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_incr,
    bench_concurrent,
    bench_expire,
    bench_protocol,
);

criterion_main!(benches);
