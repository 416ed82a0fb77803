//! Database value types
//!
//! This module defines the scalar values that can be bound as statement
//! parameters and read back from result columns.

use serde::{Deserialize, Serialize};

/// Database value that can hold each type the supported backends understand.
///
/// There is no implicit coercion between cases: drivers marshal every case
/// explicitly, and the `as_*` accessors answer `None` for any other case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DbValue {
    /// SQL NULL
    Null,
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    BigInt(i64),
    /// Double-precision floating point
    Double(f64),
    /// Boolean value
    Bool(bool),
    /// UTF-8 text, length-delimited
    Text(String),
    /// Opaque byte sequence, embedded zeros allowed
    Blob(Vec<u8>),
}

impl DbValue {
    /// Check if the value is the Null case
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Get the value as an i32
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            DbValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64; `Int` widens losslessly
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::BigInt(v) => Some(*v),
            DbValue::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DbValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice (zero-copy, Text only)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as a byte slice (zero-copy, Blob only)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DbValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Int(_) => "int",
            DbValue::BigInt(_) => "bigint",
            DbValue::Double(_) => "double",
            DbValue::Bool(_) => "bool",
            DbValue::Text(_) => "text",
            DbValue::Blob(_) => "blob",
        }
    }
}

impl std::fmt::Display for DbValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbValue::Null => write!(f, "NULL"),
            DbValue::Int(v) => write!(f, "{}", v),
            DbValue::BigInt(v) => write!(f, "{}", v),
            DbValue::Double(v) => write!(f, "{}", v),
            DbValue::Bool(v) => write!(f, "{}", if *v { "true" } else { "false" }),
            DbValue::Text(s) => write!(f, "{}", s),
            DbValue::Blob(_) => write!(f, "[BLOB]"),
        }
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::BigInt(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Double(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Blob(v)
    }
}

impl From<&[u8]> for DbValue {
    fn from(v: &[u8]) -> Self {
        DbValue::Blob(v.to_vec())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}
