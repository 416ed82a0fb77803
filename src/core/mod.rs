//! Core types and abstractions
//!
//! The abstract surface every driver implements, the shared value and error
//! models, the connection pool, the manager and the observability plumbing.

pub mod driver;
pub mod error;
pub mod logging;
pub mod manager;
pub mod pool;
pub mod query;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use driver::{Connection, Driver, ResultSet};
pub use error::{DbError, DbErrorKind, ErrorCounters, Result};
pub use logging::{OperationContext, OperationScope};
pub use manager::DatabaseManager;
pub use pool::{ConnectionFactory, ConnectionPool, PoolMetrics, PoolOptions, PooledConnection};
pub use query::{query_all, query_one, DbRow};
pub use transaction::TransactionGuard;
pub use value::DbValue;
