//! Concrete driver implementations

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteDriver};

#[cfg(feature = "mysql")]
pub use mysql::{MysqlConnection, MysqlDriver};
