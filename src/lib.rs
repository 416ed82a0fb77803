//! # smartdb
//!
//! A driver-agnostic relational database access layer: one abstract surface
//! for opening connections, executing parameterised statements, iterating
//! result sets and running transactions, with concrete drivers for SQLite
//! (embedded engine) and MySQL (native client protocol) plugging in behind
//! a registry.
//!
//! ## Features
//!
//! - **Unified value model**: a small tagged union ([`DbValue`]) marshalled
//!   explicitly to each backend's wire format
//! - **Bounded connection pool**: lazy creation, LIFO idle reuse,
//!   borrow-time health checks, blocking acquisition with deadline and
//!   observability counters
//! - **Scoped transactions**: [`TransactionGuard`] rolls back on drop unless
//!   committed
//! - **Manager**: driver registry, named configurations, memoised pools
//! - **Structured failure taxonomy**: every fallible operation returns a
//!   [`Result`] whose error carries kind, backend code and a retryability
//!   advisory
//!
//! The core is synchronous; all blocking waits sit on a condition variable.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use smartdb::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> smartdb::Result<()> {
//!     let manager = DatabaseManager::new();
//!     manager.register_driver(Arc::new(SqliteDriver))?;
//!     manager.load_config(&serde_json::json!({
//!         "connections": {
//!             "main": { "driver": "sqlite", "path": ":memory:" }
//!         }
//!     }))?;
//!
//!     let mut conn = manager.create_connection("main")?;
//!     conn.open()?;
//!     conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!     conn.execute_with_params(
//!         "INSERT INTO users (name) VALUES (?)",
//!         &[DbValue::Text("Alice".into())],
//!     )?;
//!
//!     let mut rows = conn.query("SELECT id, name FROM users")?;
//!     while rows.next() {
//!         println!("{}: {}", rows.get_named("id"), rows.get_named("name"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Pooling
//!
//! ```rust,no_run
//! use smartdb::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> smartdb::Result<()> {
//!     let manager = DatabaseManager::new();
//!     manager.register_driver(Arc::new(SqliteDriver))?;
//!
//!     let pool = manager.create_pool_raw(
//!         "sqlite",
//!         &serde_json::json!({ "path": "local_data.db" }),
//!         PoolOptions {
//!             min_size: 1,
//!             max_size: 4,
//!             wait_timeout: Duration::from_millis(2000),
//!             ..PoolOptions::default()
//!         },
//!     )?;
//!
//!     let mut conn = pool.acquire()?;
//!     conn.execute("CREATE TABLE IF NOT EXISTS pool_tb (id INTEGER, val TEXT)")?;
//!     Ok(())
//! }
//! ```

/// Core types, traits and infrastructure
pub mod core;

/// Database backend implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use smartdb::prelude::*;
///
/// let value = DbValue::from(42);
/// assert_eq!(value.as_i32(), Some(42));
/// ```
pub mod prelude {
    pub use crate::core::{
        query_all, query_one, Connection, ConnectionPool, DatabaseManager, DbError, DbErrorKind,
        DbRow, DbValue, Driver, ErrorCounters, OperationContext, OperationScope, PoolMetrics,
        PoolOptions, PooledConnection, Result, ResultSet, TransactionGuard,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDriver;

    #[cfg(feature = "mysql")]
    pub use crate::backends::MysqlDriver;
}

// Re-export at root level for convenience
pub use crate::core::{
    Connection, ConnectionFactory, ConnectionPool, DatabaseManager, DbError, DbErrorKind, DbRow,
    DbValue, Driver, ErrorCounters, OperationContext, OperationScope, PoolMetrics, PoolOptions,
    PooledConnection, Result, ResultSet, TransactionGuard,
};

#[cfg(feature = "sqlite")]
pub use crate::backends::SqliteDriver;

#[cfg(feature = "mysql")]
pub use crate::backends::MysqlDriver;
