//! Conversions between runtime values and SQLite storage classes.
//!
//! SQLite has five storage classes, so temporal values, guids and decimals travel as text. Rows
//! come back in their storage class and are narrowed to the declared column type by the
//! `TypeMap` coercions.

use rusqlite::types::{Value as SqlValue, ValueRef};
use tessera_core::Value;
use tessera_storage_common::types::text;

pub fn to_sql(value: &Option<Value>) -> SqlValue {
    let Some(value) = value else { return SqlValue::Null };
    match value {
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::I16(i) => SqlValue::Integer(*i as i64),
        Value::I32(i) => SqlValue::Integer(*i as i64),
        Value::I64(i) => SqlValue::Integer(*i),
        Value::F64(f) => SqlValue::Real(*f),
        Value::Decimal(s) | Value::String(s) => SqlValue::Text(s.clone()),
        Value::Binary(bytes) => SqlValue::Blob(bytes.clone()),
        Value::Guid(id) => SqlValue::Text(id.hyphenated().to_string()),
        Value::Date(date) => SqlValue::Text(text::date(date)),
        Value::DateTime(datetime) => SqlValue::Text(text::datetime(datetime)),
        Value::Timestamp(timestamp) => SqlValue::Text(text::timestamp(timestamp)),
    }
}

pub fn from_sql(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(Value::I64(i)),
        ValueRef::Real(f) => Some(Value::F64(f)),
        ValueRef::Text(bytes) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(bytes) => Some(Value::Binary(bytes.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_text_encodings() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(to_sql(&Some(Value::Timestamp(ts))), SqlValue::Text("2024-03-01T12:30:00.000000Z".into()));
        assert_eq!(to_sql(&Some(Value::Guid(Uuid::nil()))), SqlValue::Text("00000000-0000-0000-0000-000000000000".into()));
        assert_eq!(to_sql(&Some(Value::Bool(true))), SqlValue::Integer(1));
        assert_eq!(to_sql(&None), SqlValue::Null);
    }

    #[test]
    fn test_storage_classes() {
        assert_eq!(from_sql(ValueRef::Integer(3)), Some(Value::I64(3)));
        assert_eq!(from_sql(ValueRef::Text(b"abc")), Some(Value::String("abc".into())));
        assert_eq!(from_sql(ValueRef::Null), None);
    }
}
