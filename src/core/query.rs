//! Row-shaped convenience helpers over the connection capability

use super::driver::Connection;
use super::error::{DbError, Result};
use super::value::DbValue;

/// One materialised row, positional
pub type DbRow = Vec<DbValue>;

/// Run a row-returning statement and take the first row.
///
/// Zero rows is a NotFound error; extra rows are left unread.
pub fn query_one(conn: &mut dyn Connection, sql: &str) -> Result<DbRow> {
    let mut rs = conn.query(sql)?;
    if !rs.next() {
        return Err(DbError::not_found("No rows returned"));
    }

    let width = rs.column_names().len();
    let mut row = Vec::with_capacity(width);
    for i in 0..width {
        row.push(rs.get(i));
    }
    Ok(row)
}

/// Run a row-returning statement and materialise every row
pub fn query_all(conn: &mut dyn Connection, sql: &str) -> Result<Vec<DbRow>> {
    let mut rs = conn.query(sql)?;
    let width = rs.column_names().len();

    let mut rows = Vec::new();
    while rs.next() {
        let mut row = Vec::with_capacity(width);
        for i in 0..width {
            row.push(rs.get(i));
        }
        rows.push(row);
    }
    Ok(rows)
}
