//! MySQL driver over the native client protocol
//!
//! Configuration keys and defaults: `host` (`127.0.0.1`), `port` (3306),
//! `user` (`root`), `password` (empty), `database` (empty, meaning no
//! default schema), `charset` (`utf8mb4`). Unknown keys are ignored.
//!
//! Non-parameterised statements use the text protocol; parameterised
//! statements go through the binary prepared-statement protocol, with the
//! affected-row count taken from the statement result.

use crate::core::driver::{Connection, Driver, ResultSet};
use crate::core::error::{DbError, DbErrorKind, Result};
use crate::core::value::DbValue;

use mysql::consts::ColumnType;
use mysql::prelude::Queryable;
use mysql::{OptsBuilder, Params, Value as MysqlValue};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Driver for MySQL via the native client protocol
pub struct MysqlDriver;

impl Driver for MysqlDriver {
    fn name(&self) -> &str {
        "mysql"
    }

    fn create_connection(&self, config: &serde_json::Value) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MysqlConnection {
            config: config.clone(),
            conn: None,
        }))
    }
}

/// A single MySQL connection
pub struct MysqlConnection {
    config: serde_json::Value,
    conn: Option<mysql::Conn>,
}

impl MysqlConnection {
    fn handle(&mut self) -> Result<&mut mysql::Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::connection("Connection is not open"))
    }

    fn config_str(&self, key: &str, default: &str) -> String {
        self.config
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(default)
            .to_string()
    }
}

impl Connection for MysqlConnection {
    fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let host = self.config_str("host", "127.0.0.1");
        let port = self
            .config
            .get("port")
            .and_then(serde_json::Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(3306);
        let user = self.config_str("user", "root");
        let password = self.config_str("password", "");
        let database = self.config_str("database", "");
        let charset = self.config_str("charset", "utf8mb4");

        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(user))
            .pass(Some(password))
            .db_name(if database.is_empty() {
                None
            } else {
                Some(database)
            })
            .tcp_connect_timeout(Some(CONNECT_TIMEOUT))
            .init(vec![format!("SET NAMES {}", charset)]);

        let conn = mysql::Conn::new(opts).map_err(map_connect_error)?;
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the client handle sends COM_QUIT and tears the socket down.
        self.conn = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let conn = self.handle()?;
        let mut result = conn
            .query_iter(sql)
            .map_err(|e| map_mysql_error(e, DbErrorKind::Query))?;
        collect_rows(&mut result)
    }

    fn query_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<ResultSet> {
        let conn = self.handle()?;
        let stmt = conn
            .prep(sql)
            .map_err(|e| map_mysql_error(e, DbErrorKind::Query))?;
        check_param_count(usize::from(stmt.num_params()), params.len())?;

        let values: Vec<MysqlValue> = params.iter().map(to_mysql_value).collect();
        let mut result = conn
            .exec_iter(&stmt, Params::Positional(values))
            .map_err(|e| map_mysql_error(e, DbErrorKind::Query))?;
        collect_rows(&mut result)
    }

    fn execute(&mut self, sql: &str) -> Result<i64> {
        let conn = self.handle()?;
        conn.query_drop(sql)
            .map_err(|e| map_mysql_error(e, DbErrorKind::Execution))?;
        Ok(normalize_affected(conn.affected_rows()))
    }

    fn execute_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<i64> {
        let conn = self.handle()?;
        let stmt = conn
            .prep(sql)
            .map_err(|e| map_mysql_error(e, DbErrorKind::Execution))?;
        check_param_count(usize::from(stmt.num_params()), params.len())?;

        let values: Vec<MysqlValue> = params.iter().map(to_mysql_value).collect();
        let result = conn
            .exec_iter(&stmt, Params::Positional(values))
            .map_err(|e| map_mysql_error(e, DbErrorKind::Execution))?;
        Ok(normalize_affected(result.affected_rows()))
    }

    fn begin(&mut self) -> Result<()> {
        self.handle()?
            .query_drop("START TRANSACTION")
            .map_err(|e| map_mysql_error(e, DbErrorKind::Transaction))
    }

    fn commit(&mut self) -> Result<()> {
        self.handle()?
            .query_drop("COMMIT")
            .map_err(|e| map_mysql_error(e, DbErrorKind::Transaction))
    }

    fn rollback(&mut self) -> Result<()> {
        self.handle()?
            .query_drop("ROLLBACK")
            .map_err(|e| map_mysql_error(e, DbErrorKind::Transaction))
    }
}

fn collect_rows<P: mysql::prelude::Protocol>(
    result: &mut mysql::QueryResult<'_, '_, '_, P>,
) -> Result<ResultSet> {
    let columns: Vec<(String, ColumnType)> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| (c.name_str().into_owned(), c.column_type()))
        .collect();
    let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();

    let mut rows = Vec::new();
    for row in result.by_ref() {
        let row = row.map_err(|e| map_mysql_error(e, DbErrorKind::Query))?;
        let decoded = row
            .unwrap()
            .into_iter()
            .zip(columns.iter())
            .map(|(value, (_, col_type))| decode_cell(*col_type, value))
            .collect();
        rows.push(decoded);
    }

    Ok(ResultSet::new(names, rows))
}

fn to_mysql_value(value: &DbValue) -> MysqlValue {
    match value {
        DbValue::Null => MysqlValue::NULL,
        DbValue::Int(v) => MysqlValue::Int(i64::from(*v)),
        DbValue::BigInt(v) => MysqlValue::Int(*v),
        DbValue::Double(v) => MysqlValue::Double(*v),
        DbValue::Bool(v) => MysqlValue::Int(i64::from(*v)),
        DbValue::Text(s) => MysqlValue::Bytes(s.clone().into_bytes()),
        DbValue::Blob(b) => MysqlValue::Bytes(b.clone()),
    }
}

fn decode_cell(col_type: ColumnType, value: MysqlValue) -> DbValue {
    match value {
        MysqlValue::NULL => DbValue::Null,
        MysqlValue::Bytes(bytes) => decode_bytes(col_type, bytes),
        MysqlValue::Int(v) => decode_int(col_type, v),
        MysqlValue::UInt(v) => match i64::try_from(v) {
            Ok(v) => decode_int(col_type, v),
            Err(_) => DbValue::Text(v.to_string()),
        },
        MysqlValue::Float(v) => DbValue::Double(f64::from(v)),
        MysqlValue::Double(v) => DbValue::Double(v),
        MysqlValue::Date(y, mo, d, h, mi, s, us) => DbValue::Text(if us > 0 {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                y, mo, d, h, mi, s, us
            )
        } else {
            format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s)
        }),
        MysqlValue::Time(neg, d, h, mi, s, us) => {
            let sign = if neg { "-" } else { "" };
            let hours = u32::from(h) + u32::from(d) * 24;
            DbValue::Text(if us > 0 {
                format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us)
            } else {
                format!("{}{:02}:{:02}:{:02}", sign, hours, mi, s)
            })
        }
    }
}

/// Text-protocol cells arrive as raw bytes; interpret them by column type.
/// Any numeric parse failure falls back to the raw bytes as text.
fn decode_bytes(col_type: ColumnType, bytes: Vec<u8>) -> DbValue {
    let as_text = |bytes: Vec<u8>| DbValue::Text(String::from_utf8_lossy(&bytes).into_owned());
    match col_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24 => {
            match std::str::from_utf8(&bytes).ok().and_then(|s| s.parse::<i64>().ok()) {
                Some(v) => narrow_int(v),
                None => as_text(bytes),
            }
        }
        ColumnType::MYSQL_TYPE_LONGLONG => {
            match std::str::from_utf8(&bytes).ok().and_then(|s| s.parse::<i64>().ok()) {
                Some(v) => DbValue::BigInt(v),
                None => as_text(bytes),
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT
        | ColumnType::MYSQL_TYPE_DOUBLE
        | ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            match std::str::from_utf8(&bytes).ok().and_then(|s| s.parse::<f64>().ok()) {
                Some(v) => DbValue::Double(v),
                None => as_text(bytes),
            }
        }
        ColumnType::MYSQL_TYPE_BIT => {
            if bytes.len() == 1 {
                DbValue::Bool(bytes[0] != 0)
            } else {
                DbValue::Bool(bytes == b"1")
            }
        }
        ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_GEOMETRY => DbValue::Blob(bytes),
        _ => as_text(bytes),
    }
}

/// Binary-protocol integer cells: small column types narrow to i32 when
/// representable, LONGLONG stays 64-bit.
fn decode_int(col_type: ColumnType, v: i64) -> DbValue {
    match col_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24 => narrow_int(v),
        _ => DbValue::BigInt(v),
    }
}

fn narrow_int(v: i64) -> DbValue {
    match i32::try_from(v) {
        Ok(v) => DbValue::Int(v),
        Err(_) => DbValue::BigInt(v),
    }
}

fn normalize_affected(affected: u64) -> i64 {
    // The client reports an unsigned sentinel when the count is unknown;
    // that and anything unrepresentable is pinned to 0.
    i64::try_from(affected).unwrap_or(0)
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

fn map_connect_error(err: mysql::Error) -> DbError {
    match &err {
        mysql::Error::MySqlError(server) => {
            let kind = match server.code {
                1044 | 1045 | 1698 => DbErrorKind::Authentication,
                _ => DbErrorKind::Connection,
            };
            DbError::new(kind, err.to_string()).with_code(i32::from(server.code))
        }
        mysql::Error::UrlError(_) => DbError::configuration(err.to_string()),
        _ => DbError::connection(err.to_string()),
    }
}

fn map_mysql_error(err: mysql::Error, kind: DbErrorKind) -> DbError {
    let code = match &err {
        mysql::Error::MySqlError(server) => i32::from(server.code),
        _ => 0,
    };
    DbError::new(kind, err.to_string()).with_code(code)
}
