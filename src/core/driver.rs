//! Driver and connection capability traits
//!
//! Every backend plugs in by implementing [`Driver`] (a named connection
//! factory) and [`Connection`] (the statement surface). Client code writes
//! against these traits only; statement text is forwarded to the backend
//! verbatim.

use super::error::Result;
use super::value::DbValue;

/// Connection factory for one backend.
///
/// `create_connection` must not perform I/O; the handshake is deferred to
/// [`Connection::open`].
pub trait Driver: Send + Sync {
    /// Stable driver name, used as the registry key (`"sqlite"`, `"mysql"`)
    fn name(&self) -> &str;

    /// Produce a fresh, unopened connection for the given configuration bag.
    ///
    /// The configuration is a string-keyed JSON object; the driver-specific
    /// keys are documented on each backend. Unknown keys are ignored.
    fn create_connection(&self, config: &serde_json::Value) -> Result<Box<dyn Connection>>;
}

/// A single database connection.
///
/// State machine: `Unopened -> Open <-> Closed`. A connection is exclusively
/// owned by whoever holds it and may be moved between threads, but is not
/// safe for concurrent use.
impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("is_open", &self.is_open())
            .finish()
    }
}

pub trait Connection: Send {
    /// Open the connection. Idempotent while already open.
    ///
    /// On failure the connection stays unopened and the error carries kind
    /// Connection, Authentication or Configuration plus the backend code
    /// when one is available.
    fn open(&mut self) -> Result<()>;

    /// Close the connection. Idempotent in every state.
    fn close(&mut self) -> Result<()>;

    /// Whether the connection is currently open
    fn is_open(&self) -> bool;

    /// Run a statement expected to return rows.
    ///
    /// A statement that returns no rows yields an empty [`ResultSet`], not
    /// an error.
    fn query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Run a parameterised statement expected to return rows.
    ///
    /// The parameter vector is positional against the backend's native `?`
    /// placeholders; a length mismatch fails with kind InvalidArgument and a
    /// message containing `parameter count mismatch`.
    fn query_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<ResultSet>;

    /// Run a statement and report the backend's affected-row count.
    ///
    /// Never returns -1; an unknown affected count is reported as 0.
    fn execute(&mut self, sql: &str) -> Result<i64>;

    /// Run a parameterised statement and report the affected-row count
    fn execute_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<i64>;

    /// Begin a transaction. Semantics are the backend's; no savepoint stack
    /// is layered on top.
    fn begin(&mut self) -> Result<()>;

    /// Commit the current transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction
    fn rollback(&mut self) -> Result<()>;
}

/// Forward-only cursor over the rows produced by a single `query`.
///
/// Column names and types are captured at construction from the backend
/// metadata; the rows themselves are materialised eagerly, so the cursor
/// does not borrow the connection. States: before-first, on-row, after-last.
/// Reads outside the on-row state, with an out-of-range index or an unknown
/// column name, yield [`DbValue::Null`] rather than an error so call sites
/// stay tolerant of schema drift.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<DbValue>>,
    cursor: Option<usize>,
}

impl ResultSet {
    /// Build a result set from captured column metadata and row data
    pub fn new(columns: Vec<String>, rows: Vec<Vec<DbValue>>) -> Self {
        ResultSet {
            columns,
            rows,
            cursor: None,
        }
    }

    /// An empty result set with no columns (row-less statements)
    pub fn empty() -> Self {
        ResultSet::new(Vec::new(), Vec::new())
    }

    /// Advance to the next row. Returns `true` while a row became current;
    /// keeps returning `false` once the end has been reached.
    pub fn next(&mut self) -> bool {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next < self.rows.len() {
            self.cursor = Some(next);
            true
        } else {
            self.cursor = Some(self.rows.len());
            false
        }
    }

    /// Read a column of the current row by position
    pub fn get(&self, index: usize) -> DbValue {
        match self.current_row() {
            Some(row) => row.get(index).cloned().unwrap_or(DbValue::Null),
            None => DbValue::Null,
        }
    }

    /// Read a column of the current row by name
    pub fn get_named(&self, name: &str) -> DbValue {
        match self.columns.iter().position(|c| c == name) {
            Some(index) => self.get(index),
            None => DbValue::Null,
        }
    }

    /// Column names captured at construction
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn current_row(&self) -> Option<&Vec<DbValue>> {
        match self.cursor {
            Some(i) if i < self.rows.len() => self.rows.get(i),
            _ => None,
        }
    }
}
