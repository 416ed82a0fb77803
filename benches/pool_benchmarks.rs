//! Criterion benchmarks for smartdb

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use smartdb::prelude::*;
use std::time::Duration;

// ============================================================================
// DbValue construction
// ============================================================================

fn bench_value_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_creation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("int", |b| {
        b.iter(|| black_box(DbValue::from(black_box(42i32))));
    });

    group.bench_function("bigint", |b| {
        b.iter(|| black_box(DbValue::from(black_box(123_456_789i64))));
    });

    group.bench_function("text", |b| {
        b.iter(|| black_box(DbValue::from(black_box("Hello, World!"))));
    });

    group.bench_function("blob", |b| {
        let data = vec![1u8, 2, 3, 4, 5];
        b.iter(|| black_box(DbValue::from(black_box(data.clone()))));
    });

    group.finish();
}

// ============================================================================
// Pool acquire/release cycle
// ============================================================================

#[cfg(feature = "sqlite")]
fn bench_pool_acquire_release(c: &mut Criterion) {
    use smartdb::Driver;

    let pool = ConnectionPool::with_factory(
        Box::new(|| SqliteDriver.create_connection(&serde_json::json!({"path": ":memory:"}))),
        PoolOptions {
            min_size: 1,
            max_size: 4,
            wait_timeout: Duration::from_millis(1000),
            ..PoolOptions::default()
        },
    )
    .expect("pool");

    let mut group = c.benchmark_group("pool");
    group.throughput(Throughput::Elements(1));
    group.bench_function("acquire_release", |b| {
        b.iter(|| {
            let handle = pool.acquire().expect("acquire");
            black_box(&handle);
        });
    });
    group.finish();
}

// ============================================================================
// SQLite statement execution
// ============================================================================

#[cfg(feature = "sqlite")]
fn bench_sqlite_execute(c: &mut Criterion) {
    use smartdb::Driver;

    let mut conn = SqliteDriver
        .create_connection(&serde_json::json!({"path": ":memory:"}))
        .expect("create");
    conn.open().expect("open");
    conn.execute("CREATE TABLE bench_tb (id INTEGER, val TEXT)")
        .expect("create table");

    let mut group = c.benchmark_group("sqlite");
    group.throughput(Throughput::Elements(1));
    group.bench_function("parameterised_insert", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            conn.execute_with_params(
                "INSERT INTO bench_tb VALUES (?, ?)",
                &[DbValue::BigInt(i), DbValue::Text("bench".into())],
            )
            .expect("insert")
        });
    });
    group.finish();
}

#[cfg(feature = "sqlite")]
criterion_group!(
    benches,
    bench_value_creation,
    bench_pool_acquire_release,
    bench_sqlite_execute
);

#[cfg(not(feature = "sqlite"))]
criterion_group!(benches, bench_value_creation);

criterion_main!(benches);
