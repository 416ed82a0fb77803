//! Error types for database operations
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Errors carry
//! a closed kind taxonomy, the backend numeric code when one is available,
//! and a retryability advisory that lets the pool distinguish transient from
//! fatal failures.

use serde::{Deserialize, Serialize};

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Closed taxonomy of database error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbErrorKind {
    /// Origin could not be classified
    Unknown,
    /// Bad or missing configuration
    Configuration,
    /// Transport-level connection failure
    Connection,
    /// Credential or privilege failure
    Authentication,
    /// A deadline elapsed
    Timeout,
    /// Named entity (config, driver, row) does not exist
    NotFound,
    /// Caller passed an invalid argument
    InvalidArgument,
    /// Transaction demarcation failure
    Transaction,
    /// Row-returning statement failure
    Query,
    /// Non-row statement failure
    Execution,
    /// Library-internal fault
    Internal,
}

impl DbErrorKind {
    /// Stable string form, used in structured log records
    pub fn as_str(&self) -> &'static str {
        match self {
            DbErrorKind::Unknown => "Unknown",
            DbErrorKind::Configuration => "Configuration",
            DbErrorKind::Connection => "Connection",
            DbErrorKind::Authentication => "Authentication",
            DbErrorKind::Timeout => "Timeout",
            DbErrorKind::NotFound => "NotFound",
            DbErrorKind::InvalidArgument => "InvalidArgument",
            DbErrorKind::Transaction => "Transaction",
            DbErrorKind::Query => "Query",
            DbErrorKind::Execution => "Execution",
            DbErrorKind::Internal => "Internal",
        }
    }

    /// All kinds, in declaration order. Used by [`ErrorCounters`].
    pub const ALL: [DbErrorKind; 11] = [
        DbErrorKind::Unknown,
        DbErrorKind::Configuration,
        DbErrorKind::Connection,
        DbErrorKind::Authentication,
        DbErrorKind::Timeout,
        DbErrorKind::NotFound,
        DbErrorKind::InvalidArgument,
        DbErrorKind::Transaction,
        DbErrorKind::Query,
        DbErrorKind::Execution,
        DbErrorKind::Internal,
    ];

    fn index(self) -> usize {
        DbErrorKind::ALL
            .iter()
            .position(|k| *k == self)
            .unwrap_or(0)
    }
}

impl std::fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error record for a failed database operation
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct DbError {
    /// Backend numeric code, 0 when none
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Error kind
    pub kind: DbErrorKind,
    /// Advisory: retrying the operation may succeed
    pub retryable: bool,
}

impl DbError {
    /// Create a new error of the given kind
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        DbError {
            code: 0,
            message: message.into(),
            kind,
            retryable: false,
        }
    }

    /// Attach the backend numeric code
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Mark the error as retryable
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Configuration, message)
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Connection, message)
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Authentication, message)
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Timeout, message)
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::NotFound, message)
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::InvalidArgument, message)
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Transaction, message)
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Query, message)
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Execution, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        DbError::new(DbErrorKind::Internal, message)
    }
}

/// Cumulative per-kind error counters, kept by the manager for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    counts: [u64; 11],
}

impl ErrorCounters {
    /// Record one error of the given kind
    pub fn increment(&mut self, kind: DbErrorKind) {
        self.counts[kind.index()] += 1;
    }

    /// Read the count for one kind
    pub fn get(&self, kind: DbErrorKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Sum across all kinds
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
