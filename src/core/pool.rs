//! Bounded, thread-safe connection pool
//!
//! The pool owns a bounded population of connections produced by a factory
//! closure, serves them LIFO for cache warmth, validates them at borrow
//! time, and blocks acquirers on a condition variable up to a configurable
//! deadline. Handles return their connection on drop, including on panic
//! unwind paths.

use super::driver::Connection;
use super::error::{DbError, DbErrorKind, Result};
use super::logging::{log_db_error, LogLevel};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Factory producing fresh unopened connections for the pool
pub type ConnectionFactory = Box<dyn Fn() -> Result<Box<dyn Connection>> + Send + Sync>;

/// Pool sizing and validation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Connections pre-warmed at construction
    pub min_size: usize,
    /// Hard ceiling on live connections; must be at least 1
    pub max_size: usize,
    /// How long `acquire` may block; zero means fail fast
    pub wait_timeout: Duration,
    /// Validate (and reopen if needed) connections on borrow
    pub test_on_borrow: bool,
    /// Drop connections that are no longer open on return
    pub test_on_return: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            min_size: 0,
            max_size: 16,
            wait_timeout: Duration::from_millis(5000),
            test_on_borrow: true,
            test_on_return: false,
        }
    }
}

impl PoolOptions {
    /// Clamp `min_size` down to `max_size`
    pub(crate) fn normalized(mut self) -> Self {
        if self.min_size > self.max_size {
            self.min_size = self.max_size;
        }
        self
    }
}

/// Snapshot of the pool's cumulative counters and derived gauges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Acquisitions started
    pub acquire_attempts: u64,
    /// Acquisitions that returned a handle
    pub acquire_successes: u64,
    /// Acquisitions that returned an error
    pub acquire_failures: u64,
    /// Failures whose kind was Timeout
    pub acquire_timeouts: u64,
    /// Times an acquirer blocked on the condition variable
    pub wait_events: u64,
    /// Factory invocations that returned an error
    pub factory_failures: u64,
    /// Total microseconds acquirers spent inside `acquire`
    pub total_acquire_wait_micros: u64,
    /// High-water mark of in-use connections since the last reset
    pub peak_in_use: usize,
    /// `total_acquire_wait_micros / (successes + failures)`, 0 when idle
    pub average_acquire_wait_micros: u64,
}

#[derive(Default)]
struct MetricsState {
    acquire_attempts: u64,
    acquire_successes: u64,
    acquire_failures: u64,
    acquire_timeouts: u64,
    wait_events: u64,
    factory_failures: u64,
    total_acquire_wait_micros: u64,
    peak_in_use: usize,
}

struct PoolState {
    idle: Vec<Box<dyn Connection>>,
    total: usize,
    closed: bool,
    metrics: MetricsState,
}

/// Bounded multi-producer/multi-consumer connection pool.
///
/// Invariants: `0 <= idle <= total <= max_size`; once closed, `idle` is
/// empty and every acquisition fails. The internal mutex is released across
/// every call into a connection, across factory invocations, and across
/// condition-variable waits.
pub struct ConnectionPool {
    factory: ConnectionFactory,
    options: PoolOptions,
    state: Mutex<PoolState>,
    cond: Condvar,
    // Handed to every handle so its drop can find the issuing pool.
    self_ref: Weak<ConnectionPool>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool").finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Build a pool around a connection factory.
    ///
    /// `max_size == 0` is rejected with InvalidArgument; `min_size` is
    /// clamped down to `max_size`. Pre-warming creates and opens `min_size`
    /// connections; any that fail are silently discarded and the pool
    /// continues with whatever subset succeeded.
    pub fn with_factory(factory: ConnectionFactory, options: PoolOptions) -> Result<Arc<Self>> {
        let options = options.normalized();
        if options.max_size == 0 {
            return Err(DbError::invalid_argument(
                "ConnectionPool maxSize must be greater than 0",
            ));
        }

        let mut idle: Vec<Box<dyn Connection>> = Vec::with_capacity(options.max_size);
        for _ in 0..options.min_size {
            let Ok(mut conn) = factory() else {
                continue;
            };
            if conn.open().is_ok() {
                idle.push(conn);
            } else {
                let _ = conn.close();
            }
        }

        let total = idle.len();
        Ok(Arc::new_cyclic(|weak| ConnectionPool {
            factory,
            options,
            state: Mutex::new(PoolState {
                idle,
                total,
                closed: false,
                metrics: MetricsState::default(),
            }),
            cond: Condvar::new(),
            self_ref: weak.clone(),
        }))
    }

    /// Borrow a connection, blocking up to `wait_timeout`.
    ///
    /// The returned handle gives exclusive access to the connection and
    /// returns it to this pool when dropped.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let started = Instant::now();
        let deadline = started + self.options.wait_timeout;
        let mut state = self.state.lock();
        state.metrics.acquire_attempts += 1;

        loop {
            if state.closed {
                let err = DbError::connection("Connection pool is closed").retryable();
                return Err(self.record_failure(&mut state, started, err));
            }

            if let Some(mut conn) = state.idle.pop() {
                drop(state);
                if !self.options.test_on_borrow || ensure_open(conn.as_mut()) {
                    return Ok(self.finish_acquire(conn, started));
                }
                let _ = conn.close();
                drop(conn);
                state = self.state.lock();
                state.total = state.total.saturating_sub(1);
                self.cond.notify_one();
                if self.options.wait_timeout.is_zero() || Instant::now() >= deadline {
                    let err =
                        DbError::connection("Connection failed validation at borrow").retryable();
                    return Err(self.record_failure(&mut state, started, err));
                }
                continue;
            }

            if state.total < self.options.max_size {
                // Speculative: the slot is counted while the factory runs so
                // concurrent acquirers cannot overshoot max_size.
                state.total += 1;
                drop(state);
                match (self.factory)() {
                    Ok(mut conn) => {
                        if !self.options.test_on_borrow || ensure_open(conn.as_mut()) {
                            return Ok(self.finish_acquire(conn, started));
                        }
                        let _ = conn.close();
                        drop(conn);
                        state = self.state.lock();
                        state.total = state.total.saturating_sub(1);
                        self.cond.notify_one();
                        if self.options.wait_timeout.is_zero() || Instant::now() >= deadline {
                            let err = DbError::connection(
                                "Connection failed validation at borrow",
                            )
                            .retryable();
                            return Err(self.record_failure(&mut state, started, err));
                        }
                        continue;
                    }
                    Err(mut err) => {
                        state = self.state.lock();
                        state.total = state.total.saturating_sub(1);
                        state.metrics.factory_failures += 1;
                        self.cond.notify_one();
                        if err.kind == DbErrorKind::Unknown {
                            err.kind = DbErrorKind::Internal;
                        }
                        err.retryable = true;
                        return Err(self.record_failure(&mut state, started, err));
                    }
                }
            }

            if self.options.wait_timeout.is_zero() {
                let err = DbError::connection("Connection pool exhausted").retryable();
                return Err(self.record_failure(&mut state, started, err));
            }

            state.metrics.wait_events += 1;
            let timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
            if timed_out && !state.closed {
                let err = DbError::timeout("Connection pool acquire timed out").retryable();
                return Err(self.record_failure(&mut state, started, err));
            }
            // Woken: re-evaluate from the top (closed is checked there).
        }
    }

    /// Close the pool: drain and close the idle set and wake every waiter.
    /// Handles still in flight return through the drop-because-closed path.
    /// Idempotent; also invoked when the pool is dropped.
    pub fn shutdown(&self) {
        let drained = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained = std::mem::take(&mut state.idle);
            state.total = state.total.saturating_sub(drained.len());
            drained
        };

        for mut conn in drained {
            let _ = conn.close();
        }
        self.cond.notify_all();
    }

    /// Live connections the pool is responsible for (idle + lent)
    pub fn total_size(&self) -> usize {
        self.state.lock().total
    }

    /// Currently idle connections
    pub fn idle_size(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Currently lent connections
    pub fn in_use_size(&self) -> usize {
        let state = self.state.lock();
        state.total.saturating_sub(state.idle.len())
    }

    /// Whether the pool has been shut down
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// The normalised options this pool was built with
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Snapshot the cumulative counters and derived gauges
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.state.lock();
        let m = &state.metrics;
        let finished = m.acquire_successes + m.acquire_failures;
        PoolMetrics {
            acquire_attempts: m.acquire_attempts,
            acquire_successes: m.acquire_successes,
            acquire_failures: m.acquire_failures,
            acquire_timeouts: m.acquire_timeouts,
            wait_events: m.wait_events,
            factory_failures: m.factory_failures,
            total_acquire_wait_micros: m.total_acquire_wait_micros,
            peak_in_use: m.peak_in_use,
            average_acquire_wait_micros: if finished == 0 {
                0
            } else {
                m.total_acquire_wait_micros / finished
            },
        }
    }

    /// Zero the cumulative counters and reseat the peak gauge to the
    /// current in-use count
    pub fn reset_metrics(&self) {
        let mut state = self.state.lock();
        let in_use = state.total.saturating_sub(state.idle.len());
        state.metrics = MetricsState {
            peak_in_use: in_use,
            ..MetricsState::default()
        };
    }

    fn finish_acquire(&self, conn: Box<dyn Connection>, started: Instant) -> PooledConnection {
        let mut state = self.state.lock();
        state.metrics.acquire_successes += 1;
        state.metrics.total_acquire_wait_micros += elapsed_micros(started);
        let in_use = state.total.saturating_sub(state.idle.len());
        if in_use > state.metrics.peak_in_use {
            state.metrics.peak_in_use = in_use;
        }
        drop(state);
        PooledConnection {
            conn: Some(conn),
            pool: self.self_ref.upgrade(),
        }
    }

    fn record_failure(
        &self,
        state: &mut MutexGuard<'_, PoolState>,
        started: Instant,
        err: DbError,
    ) -> DbError {
        state.metrics.acquire_failures += 1;
        if err.kind == DbErrorKind::Timeout {
            state.metrics.acquire_timeouts += 1;
        }
        state.metrics.total_acquire_wait_micros += elapsed_micros(started);
        log_db_error(LogLevel::Warn, "pool_acquire", &err);
        err
    }

    fn release(&self, mut conn: Box<dyn Connection>) {
        let mut state = self.state.lock();
        let should_drop = state.closed || (self.options.test_on_return && !conn.is_open());
        if !should_drop {
            state.idle.push(conn);
            drop(state);
            self.cond.notify_one();
            return;
        }

        drop(state);
        let _ = conn.close();
        drop(conn);
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.cond.notify_one();
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ensure_open(conn: &mut dyn Connection) -> bool {
    conn.is_open() || conn.open().is_ok()
}

fn elapsed_micros(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Move-only owning handle to a pooled connection.
///
/// Dereferences to `dyn Connection`; dropping the handle returns the
/// connection to the pool that issued it. The handle holds a strong
/// reference to the pool, so the return target exists for the handle's
/// whole lifetime; the unreachable no-pool fallback closes the connection
/// directly.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Option<Arc<ConnectionPool>>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn.is_some())
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("pooled connection accessed after release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("pooled connection accessed after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            match self.pool.take() {
                Some(pool) => pool.release(conn),
                None => {
                    let _ = conn.close();
                }
            }
        }
    }
}
