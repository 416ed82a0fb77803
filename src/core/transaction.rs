//! Transaction guard with automatic rollback on drop
//!
//! RAII-style transaction management: a guard is armed by a successful
//! `begin` and disarmed by `commit` or `rollback`. Dropping an armed guard
//! rolls the transaction back best-effort.

use super::driver::{Connection, ResultSet};
use super::error::Result;
use super::logging::{log_db_error, LogLevel};
use super::value::DbValue;

/// Scoped transaction handle bound to exactly one connection.
///
/// The guard borrows the connection exclusively for its lifetime, so every
/// statement inside the transaction goes through the guard. If the guard
/// goes out of scope while still armed, the transaction is rolled back and
/// any rollback error is swallowed (logged at warn).
///
/// # Example
///
/// ```ignore
/// let mut tx = TransactionGuard::begin(conn.as_mut())?;
/// tx.execute("UPDATE accounts SET balance = balance - 100 WHERE id = 1")?;
/// tx.execute("UPDATE accounts SET balance = balance + 100 WHERE id = 2")?;
/// tx.commit()?; // without this, drop rolls back
/// ```
pub struct TransactionGuard<'a> {
    conn: &'a mut dyn Connection,
    armed: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Issue `begin` on the connection; on success the guard is armed
    pub fn begin(conn: &'a mut dyn Connection) -> Result<Self> {
        conn.begin()?;
        Ok(TransactionGuard { conn, armed: true })
    }

    /// Run a statement inside the transaction
    pub fn execute(&mut self, sql: &str) -> Result<i64> {
        self.conn.execute(sql)
    }

    /// Run a parameterised statement inside the transaction
    pub fn execute_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<i64> {
        self.conn.execute_with_params(sql, params)
    }

    /// Run a row-returning statement inside the transaction
    pub fn query(&mut self, sql: &str) -> Result<ResultSet> {
        self.conn.query(sql)
    }

    /// Run a parameterised row-returning statement inside the transaction
    pub fn query_with_params(&mut self, sql: &str, params: &[DbValue]) -> Result<ResultSet> {
        self.conn.query_with_params(sql, params)
    }

    /// Commit the transaction and disarm the guard.
    ///
    /// On backend failure the error is returned and the guard is consumed
    /// still armed, so its drop issues the rollback.
    pub fn commit(mut self) -> Result<()> {
        self.conn.commit()?;
        self.armed = false;
        Ok(())
    }

    /// Roll the transaction back explicitly and disarm the guard.
    ///
    /// On backend failure the guard is consumed still armed and its drop
    /// retries the rollback best-effort.
    pub fn rollback(mut self) -> Result<()> {
        self.conn.rollback()?;
        self.armed = false;
        Ok(())
    }

    /// Whether drop would still roll back
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.conn.rollback() {
                log_db_error(LogLevel::Warn, "transaction_rollback_on_drop", &err);
            }
            self.armed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DbError;

    /// Connection double that counts demarcation calls
    #[derive(Default)]
    struct ProbeConnection {
        begins: usize,
        commits: usize,
        rollbacks: usize,
        fail_commit: bool,
    }

    impl Connection for ProbeConnection {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
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
            self.begins += 1;
            Ok(())
        }
        fn commit(&mut self) -> Result<()> {
            if self.fail_commit {
                return Err(DbError::transaction("commit refused"));
            }
            self.commits += 1;
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            self.rollbacks += 1;
            Ok(())
        }
    }

    #[test]
    fn test_drop_without_commit_rolls_back_once() {
        let mut conn = ProbeConnection::default();
        {
            let _tx = TransactionGuard::begin(&mut conn).unwrap();
        }
        assert_eq!(conn.begins, 1);
        assert_eq!(conn.rollbacks, 1);
        assert_eq!(conn.commits, 0);
    }

    #[test]
    fn test_commit_disarms_guard() {
        let mut conn = ProbeConnection::default();
        {
            let tx = TransactionGuard::begin(&mut conn).unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(conn.begins, 1);
        assert_eq!(conn.commits, 1);
        assert_eq!(conn.rollbacks, 0);
    }

    #[test]
    fn test_failed_commit_still_rolls_back_on_drop() {
        let mut conn = ProbeConnection {
            fail_commit: true,
            ..ProbeConnection::default()
        };
        {
            let tx = TransactionGuard::begin(&mut conn).unwrap();
            assert!(tx.commit().is_err());
        }
        assert_eq!(conn.commits, 0);
        assert_eq!(conn.rollbacks, 1);
    }

    #[test]
    fn test_explicit_rollback() {
        let mut conn = ProbeConnection::default();
        {
            let tx = TransactionGuard::begin(&mut conn).unwrap();
            tx.rollback().unwrap();
        }
        assert_eq!(conn.rollbacks, 1);
        assert_eq!(conn.commits, 0);
    }
}
