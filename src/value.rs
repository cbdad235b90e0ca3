//! Cell values and their canonical string form

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell as read from a row source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i128),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Ordered column values of one row
pub type Row = Vec<Value>;

impl Value {
    /// Canonical string form used for keys and for every comparison.
    ///
    /// Two values are equal for diffing purposes exactly when their canonical
    /// forms are equal, whatever their variants. `Null` renders as the empty
    /// string, so it is indistinguishable from `Text("")`.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => canonical_real(*f),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    let mut hex = String::with_capacity(2 + b.len() * 2);
                    hex.push_str("0x");
                    for byte in b {
                        hex.push_str(&format!("{:02x}", byte));
                    }
                    hex
                }
            },
        }
    }
}

fn canonical_real(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        // integral reals match their integer counterparts
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i as i128)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i128)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Key of a row: the canonical form of its first column
pub fn row_key(row: &[Value]) -> String {
    row.first().map(Value::canonical).unwrap_or_default()
}
