//! SQLite driver over the embedded engine
//!
//! Configuration keys: `path` (filesystem path or the literal `:memory:`,
//! default `:memory:`) and optionally `busy_timeout` (milliseconds for the
//! engine busy handler). Unknown keys are ignored.

use crate::core::driver::{Connection, Driver, ResultSet};
use crate::core::error::{DbError, DbErrorKind, Result};
use crate::core::value::DbValue;

use rusqlite::params_from_iter;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef as SqlValueRef};
use std::time::Duration;

impl rusqlite::ToSql for DbValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DbValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            DbValue::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
            DbValue::BigInt(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            DbValue::Double(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            DbValue::Bool(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
            DbValue::Text(s) => ToSqlOutput::Borrowed(SqlValueRef::Text(s.as_bytes())),
            DbValue::Blob(b) => ToSqlOutput::Borrowed(SqlValueRef::Blob(b)),
        })
    }
}

/// Driver for the embedded SQLite engine
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn create_connection(&self, config: &serde_json::Value) -> Result<Box<dyn Connection>> {
        let path = config
            .get("path")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(":memory:")
            .to_string();
        let busy_timeout = config
            .get("busy_timeout")
            .and_then(serde_json::Value::as_u64)
            .map(Duration::from_millis);
        Ok(Box::new(SqliteConnection {
            path,
            busy_timeout,
            conn: None,
        }))
    }
}

/// A single SQLite connection
pub struct SqliteConnection {
    path: String,
    busy_timeout: Option<Duration>,
    conn: Option<rusqlite::Connection>,
}

impl SqliteConnection {
    fn handle(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::connection("Connection is not open"))
    }

    fn run_query(&mut self, sql: &str, params: Option<&[DbValue]>) -> Result<ResultSet> {
        let conn = self.handle()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Query))?;

        if let Some(params) = params {
            check_param_count(stmt.parameter_count(), params.len())?;
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = columns.len();

        let mut rows = match params {
            Some(params) => stmt.query(params_from_iter(params.iter())),
            None => stmt.query([]),
        }
        .map_err(|e| map_sqlite_error(e, DbErrorKind::Query))?;

        let mut data = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Query))?
        {
            let mut decoded = Vec::with_capacity(width);
            for i in 0..width {
                let cell = row
                    .get_ref(i)
                    .map_err(|e| map_sqlite_error(e, DbErrorKind::Query))?;
                decoded.push(decode_cell(cell));
            }
            data.push(decoded);
        }

        Ok(ResultSet::new(columns, data))
    }
}

impl Connection for SqliteConnection {
    fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn = rusqlite::Connection::open(&self.path)
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Connection))?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)
                .map_err(|e| map_sqlite_error(e, DbErrorKind::Configuration))?;
        }
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn query(&mut self, sql: &str) -> Result<ResultSet> {
        self.run_query(sql, None)
    }

    fn query_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<ResultSet> {
        self.run_query(sql, Some(params))
    }

    fn execute(&mut self, sql: &str) -> Result<i64> {
        let conn = self.handle()?;
        conn.execute_batch(sql)
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Execution))?;
        Ok(i64::try_from(conn.changes()).unwrap_or(0))
    }

    fn execute_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<i64> {
        let conn = self.handle()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Execution))?;
        check_param_count(stmt.parameter_count(), params.len())?;

        let affected = stmt
            .execute(params_from_iter(params.iter()))
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Execution))?;
        Ok(i64::try_from(affected).unwrap_or(0))
    }

    fn begin(&mut self) -> Result<()> {
        self.handle()?
            .execute_batch("BEGIN")
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Transaction))
    }

    fn commit(&mut self) -> Result<()> {
        self.handle()?
            .execute_batch("COMMIT")
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Transaction))
    }

    fn rollback(&mut self) -> Result<()> {
        self.handle()?
            .execute_batch("ROLLBACK")
            .map_err(|e| map_sqlite_error(e, DbErrorKind::Transaction))
    }
}

fn decode_cell(cell: SqlValueRef<'_>) -> DbValue {
    match cell {
        SqlValueRef::Null => DbValue::Null,
        SqlValueRef::Integer(v) => DbValue::BigInt(v),
        SqlValueRef::Real(v) => DbValue::Double(v),
        SqlValueRef::Text(bytes) => DbValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        SqlValueRef::Blob(bytes) => DbValue::Blob(bytes.to_vec()),
    }
}

fn check_param_count(expected: usize, supplied: usize) -> Result<()> {
    if expected != supplied {
        return Err(DbError::invalid_argument(format!(
            "parameter count mismatch: statement expects {}, got {}",
            expected, supplied
        )));
    }
    Ok(())
}

fn map_sqlite_error(err: rusqlite::Error, kind: DbErrorKind) -> DbError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(inner, _) => inner.extended_code,
        _ => 0,
    };
    DbError::new(kind, err.to_string()).with_code(code)
}
