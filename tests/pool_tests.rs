//! Connection pool behaviour: bounded acquisition, reuse, validation,
//! timeouts, shutdown and metrics accounting

use smartdb::{
    Connection, ConnectionFactory, ConnectionPool, DbError, DbErrorKind, DbValue, PoolOptions,
    Result, ResultSet,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scripted in-memory connection for exercising the pool deterministically
struct ScriptedConnection {
    open: bool,
    fail_open: bool,
}

impl Connection for ScriptedConnection {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(DbError::connection("scripted open failure"));
        }
        self.open = true;
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
    fn is_open(&self) -> bool {
        self.open
    }
    fn query(&mut self, _sql: &str) -> Result<ResultSet> {
        Ok(ResultSet::empty())
    }
    fn query_with_params(&mut self, _sql: &str, _params: &[DbValue]) -> Result<ResultSet> {
        Ok(ResultSet::empty())
    }
    fn execute(&mut self, _sql: &str) -> Result<i64> {
        Ok(0)
    }
    fn execute_with_params(&mut self, _sql: &str, _params: &[DbValue]) -> Result<i64> {
        Ok(0)
    }
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

fn scripted_factory(created: Arc<AtomicUsize>) -> ConnectionFactory {
    Box::new(move || {
        created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            open: false,
            fail_open: false,
        }))
    })
}

fn options(max_size: usize, wait: Duration) -> PoolOptions {
    PoolOptions {
        min_size: 0,
        max_size,
        wait_timeout: wait,
        ..PoolOptions::default()
    }
}

#[test]
fn test_acquire_reuses_the_same_connection() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = ConnectionPool::with_factory(
        scripted_factory(Arc::clone(&created)),
        options(1, Duration::ZERO),
    )
    .expect("pool");

    let first_identity = {
        let handle = pool.acquire().expect("first acquire");
        &*handle as *const dyn Connection as *const ()
    };
    let second_identity = {
        let handle = pool.acquire().expect("second acquire");
        &*handle as *const dyn Connection as *const ()
    };

    assert_eq!(first_identity, second_identity);
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.total_size(), 1);
    assert_eq!(pool.idle_size(), 1);
}

#[test]
fn test_exhausted_pool_times_out() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = ConnectionPool::with_factory(
        scripted_factory(created),
        options(1, Duration::from_millis(50)),
    )
    .expect("pool");

    let _held = pool.acquire().expect("first acquire");

    let started = Instant::now();
    let err = pool.acquire().expect_err("second acquire must time out");
    let elapsed = started.elapsed();

    assert_eq!(err.kind, DbErrorKind::Timeout);
    assert!(err.retryable);
    assert!(err.message.contains("timed out"));
    assert!(elapsed >= Duration::from_millis(40), "elapsed {:?}", elapsed);
    assert!(pool.total_size() <= 1);

    let metrics = pool.metrics();
    assert_eq!(metrics.acquire_timeouts, 1);
    assert_eq!(metrics.wait_events, 1);
}

#[test]
fn test_exhausted_pool_with_zero_wait_fails_fast() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool =
        ConnectionPool::with_factory(scripted_factory(created), options(1, Duration::ZERO))
            .expect("pool");

    let _held = pool.acquire().expect("first acquire");
    let err = pool.acquire().expect_err("second acquire must fail fast");
    assert_eq!(err.kind, DbErrorKind::Connection);
    assert!(err.message.contains("Connection pool exhausted"));
}

#[test]
fn test_concurrent_bounded_acquire() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = ConnectionPool::with_factory(
        scripted_factory(created),
        options(4, Duration::from_millis(500)),
    )
    .expect("pool");

    let mut workers = Vec::new();
    for _ in 0..12 {
        let pool = Arc::clone(&pool);
        workers.push(std::thread::spawn(move || {
            let handle = pool.acquire()?;
            std::thread::sleep(Duration::from_millis(20));
            drop(handle);
            Ok::<(), DbError>(())
        }));
    }
    for worker in workers {
        worker.join().expect("worker panicked").expect("acquire failed");
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.acquire_successes, 12);
    assert_eq!(metrics.acquire_failures, 0);
    assert!(metrics.peak_in_use <= 4, "peak {}", metrics.peak_in_use);
    assert!(pool.total_size() <= 4);
    assert_eq!(pool.idle_size(), pool.total_size());
}

#[test]
fn test_closed_pool_rejects_acquire() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool =
        ConnectionPool::with_factory(scripted_factory(created), options(2, Duration::ZERO))
            .expect("pool");

    pool.shutdown();
    assert!(pool.is_closed());
    let err = pool.acquire().expect_err("closed pool must reject");
    assert_eq!(err.kind, DbErrorKind::Connection);
    assert!(err.message.contains("Connection pool is closed"));

    // idempotent
    pool.shutdown();
    assert!(pool.is_closed());
}

#[test]
fn test_handle_returned_after_shutdown_is_closed_and_freed() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool =
        ConnectionPool::with_factory(scripted_factory(created), options(2, Duration::ZERO))
            .expect("pool");

    let handle = pool.acquire().expect("acquire");
    assert_eq!(pool.total_size(), 1);

    pool.shutdown();
    assert_eq!(pool.idle_size(), 0);
    drop(handle);
    assert_eq!(pool.total_size(), 0);
    assert_eq!(pool.idle_size(), 0);
}

#[test]
fn test_handle_drop_accounting() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool =
        ConnectionPool::with_factory(scripted_factory(created), options(2, Duration::ZERO))
            .expect("pool");

    let handle = pool.acquire().expect("acquire");
    let (total_before, idle_before) = (pool.total_size(), pool.idle_size());
    drop(handle);
    // retain path: total unchanged, idle grew by one
    assert_eq!(pool.total_size(), total_before);
    assert_eq!(pool.idle_size(), idle_before + 1);
}

#[test]
fn test_test_on_return_drops_closed_connections() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = ConnectionPool::with_factory(
        scripted_factory(created),
        PoolOptions {
            max_size: 2,
            wait_timeout: Duration::ZERO,
            test_on_return: true,
            ..PoolOptions::default()
        },
    )
    .expect("pool");

    let mut handle = pool.acquire().expect("acquire");
    handle.close().expect("close borrowed connection");
    drop(handle);
    // drop path: total decremented, nothing idles
    assert_eq!(pool.total_size(), 0);
    assert_eq!(pool.idle_size(), 0);
}

#[test]
fn test_factory_failure_is_internal_and_counted() {
    let factory: ConnectionFactory = Box::new(|| {
        Err(DbError::new(DbErrorKind::Unknown, "boom"))
    });
    let pool = ConnectionPool::with_factory(factory, options(2, Duration::ZERO)).expect("pool");

    let err = pool.acquire().expect_err("factory failure surfaces");
    assert_eq!(err.kind, DbErrorKind::Internal);
    assert!(err.retryable);
    assert_eq!(err.message, "boom");
    assert_eq!(pool.total_size(), 0);

    let metrics = pool.metrics();
    assert_eq!(metrics.factory_failures, 1);
    assert_eq!(metrics.acquire_failures, 1);
}

#[test]
fn test_borrow_validation_discards_unopenable_connections() {
    let factory: ConnectionFactory = Box::new(|| {
        Ok(Box::new(ScriptedConnection {
            open: false,
            fail_open: true,
        }))
    });
    let pool = ConnectionPool::with_factory(factory, options(2, Duration::ZERO)).expect("pool");

    let err = pool.acquire().expect_err("unopenable connection is rejected");
    assert_eq!(err.kind, DbErrorKind::Connection);
    assert!(err.retryable);
    assert_eq!(pool.total_size(), 0);
}

#[test]
fn test_waiter_is_woken_by_release() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = ConnectionPool::with_factory(
        scripted_factory(Arc::clone(&created)),
        options(1, Duration::from_millis(500)),
    )
    .expect("pool");

    let handle = pool.acquire().expect("first acquire");
    let waiter = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || pool.acquire().map(|h| drop(h)))
    };

    std::thread::sleep(Duration::from_millis(30));
    drop(handle);

    waiter
        .join()
        .expect("waiter panicked")
        .expect("waiter should obtain the released connection");
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_metrics_counter_identities() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool =
        ConnectionPool::with_factory(scripted_factory(created), options(1, Duration::ZERO))
            .expect("pool");

    let handle = pool.acquire().expect("acquire");
    let _ = pool.acquire().expect_err("exhausted");
    drop(handle);
    let _ = pool.acquire().expect("reacquire");

    let metrics = pool.metrics();
    assert_eq!(
        metrics.acquire_attempts,
        metrics.acquire_successes + metrics.acquire_failures
    );
    assert!(metrics.acquire_timeouts <= metrics.acquire_failures);
    assert_eq!(metrics.acquire_successes, 2);
    assert_eq!(metrics.acquire_failures, 1);
    assert_eq!(metrics.peak_in_use, 1);
}

#[test]
fn test_reset_metrics_reseats_peak() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool =
        ConnectionPool::with_factory(scripted_factory(created), options(2, Duration::ZERO))
            .expect("pool");

    let handle = pool.acquire().expect("acquire");
    pool.reset_metrics();
    let metrics = pool.metrics();
    assert_eq!(metrics.acquire_attempts, 0);
    assert_eq!(metrics.acquire_successes, 0);
    assert_eq!(metrics.average_acquire_wait_micros, 0);
    assert_eq!(metrics.peak_in_use, 1);
    drop(handle);
}

#[test]
fn test_prewarm_populates_idle_set() {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = ConnectionPool::with_factory(
        scripted_factory(Arc::clone(&created)),
        PoolOptions {
            min_size: 3,
            max_size: 4,
            ..PoolOptions::default()
        },
    )
    .expect("pool");

    assert_eq!(created.load(Ordering::SeqCst), 3);
    assert_eq!(pool.total_size(), 3);
    assert_eq!(pool.idle_size(), 3);
    // a pre-warmed connection satisfies an acquire without the factory
    let _handle = pool.acquire().expect("acquire");
    assert_eq!(created.load(Ordering::SeqCst), 3);
}

#[cfg(feature = "sqlite")]
mod sqlite_pool_tests {
    use super::*;
    use smartdb::backends::SqliteDriver;
    use smartdb::Driver;

    fn sqlite_factory() -> ConnectionFactory {
        Box::new(|| SqliteDriver.create_connection(&serde_json::json!({"path": ":memory:"})))
    }

    #[test]
    fn test_pooled_sqlite_connection_executes_statements() {
        let pool = ConnectionPool::with_factory(
            sqlite_factory(),
            PoolOptions {
                min_size: 1,
                max_size: 4,
                wait_timeout: Duration::from_millis(2000),
                ..PoolOptions::default()
            },
        )
        .expect("pool");

        let mut conn = pool.acquire().expect("acquire");
        conn.execute("CREATE TABLE pool_tb (id INTEGER, val TEXT)")
            .expect("create");
        conn.execute_with_params(
            "INSERT INTO pool_tb VALUES (?, ?)",
            &[1.into(), "Hello from Pool!".into()],
        )
        .expect("insert");

        let mut rs = conn
            .query_with_params("SELECT val FROM pool_tb WHERE id = ?", &[1.into()])
            .expect("select");
        assert!(rs.next());
        assert_eq!(rs.get(0), DbValue::Text("Hello from Pool!".into()));
    }

    #[test]
    fn test_concurrent_sqlite_workers_share_the_pool() {
        let pool = ConnectionPool::with_factory(
            sqlite_factory(),
            PoolOptions {
                max_size: 4,
                wait_timeout: Duration::from_millis(500),
                ..PoolOptions::default()
            },
        )
        .expect("pool");

        let mut workers = Vec::new();
        for i in 0..8 {
            let pool = Arc::clone(&pool);
            workers.push(std::thread::spawn(move || {
                let mut conn = pool.acquire()?;
                conn.execute("CREATE TABLE IF NOT EXISTS w (id INTEGER)")?;
                conn.execute_with_params("INSERT INTO w VALUES (?)", &[DbValue::Int(i)])?;
                Ok::<(), DbError>(())
            }));
        }
        for worker in workers {
            worker.join().expect("worker panicked").expect("worker failed");
        }

        assert!(pool.metrics().peak_in_use <= 4);
        assert_eq!(pool.idle_size(), pool.total_size());
    }
}
