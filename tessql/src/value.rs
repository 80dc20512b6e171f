use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A runtime value bound to a column or compared against one.
///
/// Null is not a variant: absent values travel as `Option<Value>::None`.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    /// Exact numeric kept in its canonical text form (e.g. `"12.50"`).
    Decimal(String),
    String(String),
    Binary(Vec<u8>),
    Guid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    I16,
    I32,
    I64,
    F64,
    Decimal,
    String,
    Binary,
    Guid,
    Date,
    DateTime,
    Timestamp,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::I16(_) => ValueType::I16,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F64(_) => ValueType::F64,
            Value::Decimal(_) => ValueType::Decimal,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
            Value::Guid(_) => ValueType::Guid,
            Value::Date(_) => ValueType::Date,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Timestamp(_) => ValueType::Timestamp,
        }
    }

    /// True for the value a freshly constructed field holds before anything is assigned to it.
    /// Identity keys at this value are treated as "not yet generated".
    pub fn is_default(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::I16(i) => *i == 0,
            Value::I32(i) => *i == 0,
            Value::I64(i) => *i == 0,
            Value::F64(f) => *f == 0.0,
            Value::Decimal(d) => d.trim_start_matches(['-', '+']).chars().all(|c| c == '0' || c == '.'),
            Value::String(s) => s.is_empty(),
            Value::Binary(b) => b.is_empty(),
            Value::Guid(g) => g.is_nil(),
            Value::Date(_) | Value::DateTime(_) | Value::Timestamp(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }
}

impl ValueType {
    pub fn is_integer(&self) -> bool { matches!(self, ValueType::I16 | ValueType::I32 | ValueType::I64) }

    pub fn is_numeric(&self) -> bool { self.is_integer() || matches!(self, ValueType::F64 | ValueType::Decimal) }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::I16(i) => write!(f, "{}", i),
            Value::I32(i) => write!(f, "{}", i),
            Value::I64(i) => write!(f, "{}", i),
            Value::F64(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Guid(g) => write!(f, "{}", g),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(d) => write!(f, "{}", d),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self { Value::$variant(v) }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f64 => F64,
    String => String,
    Vec<u8> => Binary,
    Uuid => Guid,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_owned()) }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self { Value::String(v.clone()) }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self { Value::Binary(v.to_vec()) }
}
