//! Conversions between stored values and declared column types.
//!
//! Backends decode whatever the database hands back (SQLite integers for booleans, text for
//! timestamps, ...). A [`TypeMap`] coerces those values to the type each column is declared with,
//! and coerces query literals to the type of the column they are compared against.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use tessera_core::{ColumnType, ColumnValues, MappingError, Value, ValueType};
use uuid::Uuid;

pub type Conversion = fn(Value) -> Result<Value, MappingError>;

/// An immutable registry of value conversions, keyed by (source type, target type).
#[derive(Clone)]
pub struct TypeMap {
    conversions: HashMap<(ValueType, ValueType), Conversion>,
}

impl fmt::Debug for TypeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("TypeMap").field("conversions", &self.conversions.len()).finish() }
}

impl Default for TypeMap {
    fn default() -> Self { Self::standard() }
}

impl TypeMap {
    /// A registry with no conversions; values must already carry their declared type.
    pub fn empty() -> Self { Self { conversions: HashMap::new() } }

    pub fn standard() -> Self {
        use ValueType::*;
        let mut map = Self::empty();
        for from in [I16, I32, I64] {
            map = map.with_conversion(from, I16, |v| integer(&v).and_then(|i| i16::try_from(i).map(Value::I16).map_err(|_| MappingError::OutOfRange(I16))));
            map = map.with_conversion(from, I32, |v| integer(&v).and_then(|i| i32::try_from(i).map(Value::I32).map_err(|_| MappingError::OutOfRange(I32))));
            map = map.with_conversion(from, I64, |v| integer(&v).map(Value::I64));
            map = map.with_conversion(from, F64, |v| integer(&v).map(|i| Value::F64(i as f64)));
            map = map.with_conversion(from, Decimal, |v| integer(&v).map(|i| Value::Decimal(i.to_string())));
            map = map.with_conversion(from, Bool, |v| integer(&v).map(|i| Value::Bool(i != 0)));
        }
        map.with_conversion(Bool, I64, |v| match v {
            Value::Bool(b) => Ok(Value::I64(b as i64)),
            other => Err(conversion(&other, I64)),
        })
        .with_conversion(F64, Decimal, |v| match v {
            Value::F64(f) => Ok(Value::Decimal(f.to_string())),
            other => Err(conversion(&other, Decimal)),
        })
        .with_conversion(Decimal, F64, |v| match v {
            Value::Decimal(d) => d.parse().map(Value::F64).map_err(|_| MappingError::InvalidText { text: d, expected: F64 }),
            other => Err(conversion(&other, F64)),
        })
        .with_conversion(String, Decimal, |v| match v {
            Value::String(s) if s.trim().parse::<f64>().is_ok() => Ok(Value::Decimal(s.trim().to_owned())),
            Value::String(s) => Err(MappingError::InvalidText { text: s, expected: Decimal }),
            other => Err(conversion(&other, Decimal)),
        })
        .with_conversion(String, Guid, |v| match v {
            Value::String(s) => Uuid::parse_str(&s).map(Value::Guid).map_err(|_| MappingError::InvalidText { text: s, expected: Guid }),
            other => Err(conversion(&other, Guid)),
        })
        .with_conversion(Binary, Guid, |v| match v {
            Value::Binary(bytes) => Uuid::from_slice(&bytes).map(Value::Guid).map_err(|_| MappingError::Conversion { from: Binary, to: Guid }),
            other => Err(conversion(&other, Guid)),
        })
        .with_conversion(String, Date, |v| match v {
            Value::String(s) => text::parse_date(&s).map(Value::Date).ok_or(MappingError::InvalidText { text: s, expected: Date }),
            other => Err(conversion(&other, Date)),
        })
        .with_conversion(String, DateTime, |v| match v {
            Value::String(s) => text::parse_datetime(&s).map(Value::DateTime).ok_or(MappingError::InvalidText { text: s, expected: DateTime }),
            other => Err(conversion(&other, DateTime)),
        })
        .with_conversion(String, Timestamp, |v| match v {
            Value::String(s) => text::parse_timestamp(&s).map(Value::Timestamp).ok_or(MappingError::InvalidText { text: s, expected: Timestamp }),
            other => Err(conversion(&other, Timestamp)),
        })
        .with_conversion(Timestamp, DateTime, |v| match v {
            Value::Timestamp(ts) => Ok(Value::DateTime(ts.naive_utc())),
            other => Err(conversion(&other, DateTime)),
        })
        .with_conversion(DateTime, Timestamp, |v| match v {
            Value::DateTime(dt) => Ok(Value::Timestamp(dt.and_utc())),
            other => Err(conversion(&other, Timestamp)),
        })
        .with_conversion(Guid, String, |v| Ok(Value::String(v.to_string())))
        .with_conversion(Decimal, String, |v| Ok(Value::String(v.to_string())))
    }

    /// Register (or replace) the conversion from `from` to `to`.
    pub fn with_conversion(mut self, from: ValueType, to: ValueType, conversion: Conversion) -> Self {
        self.conversions.insert((from, to), conversion);
        self
    }

    pub fn can_convert(&self, from: ValueType, to: ValueType) -> bool { from == to || self.conversions.contains_key(&(from, to)) }

    pub fn coerce(&self, value: Value, target: &ColumnType) -> Result<Value, MappingError> {
        let from = value.value_type();
        if from == target.base {
            return Ok(value);
        }
        match self.conversions.get(&(from, target.base)) {
            Some(convert) => convert(value),
            None => Err(MappingError::Conversion { from, to: target.base }),
        }
    }

    /// Coerce each projected column of `row` to its declared type. Columns not in the projection
    /// pass through untouched.
    pub fn coerce_row(&self, mut row: ColumnValues, projection: &[(String, ColumnType)]) -> Result<ColumnValues, MappingError> {
        for (column, column_type) in projection {
            if let Some(slot) = row.get_mut(column) {
                if let Some(value) = slot.take() {
                    *slot = Some(self.coerce(value, column_type)?);
                }
            }
        }
        Ok(row)
    }
}

fn integer(value: &Value) -> Result<i64, MappingError> {
    match value {
        Value::I16(v) => Ok(*v as i64),
        Value::I32(v) => Ok(*v as i64),
        Value::I64(v) => Ok(*v),
        other => Err(conversion(other, ValueType::I64)),
    }
}

fn conversion(value: &Value, to: ValueType) -> MappingError { MappingError::Conversion { from: value.value_type(), to } }

/// Text encodings for engines that store temporal values as strings.
pub mod text {
    use super::*;

    pub const DATE_FORMAT: &str = "%Y-%m-%d";
    pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

    pub fn date(date: &NaiveDate) -> String { date.format(DATE_FORMAT).to_string() }

    pub fn datetime(datetime: &NaiveDateTime) -> String { datetime.format(DATETIME_FORMAT).to_string() }

    /// RFC 3339 in UTC with microseconds, so stored timestamps sort lexically.
    pub fn timestamp(timestamp: &DateTime<Utc>) -> String { timestamp.to_rfc3339_opts(SecondsFormat::Micros, true) }

    pub fn parse_date(s: &str) -> Option<NaiveDate> { NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok() }

    pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
    }

    pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| parse_datetime(s).map(|dt| dt.and_utc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_width() {
        let types = TypeMap::standard();
        assert_eq!(types.coerce(Value::I64(7), &ValueType::I32.into()), Ok(Value::I32(7)));
        assert_eq!(types.coerce(Value::I64(70_000), &ValueType::I16.into()), Err(MappingError::OutOfRange(ValueType::I16)));
        assert_eq!(types.coerce(Value::I32(1), &ValueType::Bool.into()), Ok(Value::Bool(true)));
        assert_eq!(types.coerce(Value::I32(5), &ColumnType::decimal(10, 2)), Ok(Value::Decimal("5".into())));
    }

    #[test]
    fn test_text_round_trip() {
        let types = TypeMap::standard();
        let ts = Utc::now();
        let stored = Value::String(text::timestamp(&ts));
        let Value::Timestamp(back) = types.coerce(stored, &ValueType::Timestamp.into()).unwrap() else { panic!("expected a timestamp") };
        assert_eq!(back.timestamp_micros(), ts.timestamp_micros());

        let id = Uuid::new_v4();
        assert_eq!(types.coerce(Value::String(id.to_string()), &ValueType::Guid.into()), Ok(Value::Guid(id)));
        assert_eq!(types.coerce(Value::Binary(id.as_bytes().to_vec()), &ValueType::Guid.into()), Ok(Value::Guid(id)));
    }

    #[test]
    fn test_unregistered_conversion() {
        let types = TypeMap::standard();
        let err = types.coerce(Value::Bool(true), &ValueType::Guid.into()).unwrap_err();
        assert_eq!(err, MappingError::Conversion { from: ValueType::Bool, to: ValueType::Guid });
        assert!(TypeMap::empty().coerce(Value::I64(1), &ValueType::I32.into()).is_err());
    }

    #[test]
    fn test_coerce_row() {
        let types = TypeMap::standard();
        let mut row = ColumnValues::new();
        row.insert("id".into(), Some(Value::I64(3)));
        row.insert("name".into(), None);
        row.insert("extra".into(), Some(Value::I64(9)));
        let projection = vec![("id".to_string(), ColumnType::new(ValueType::I32)), ("name".to_string(), ColumnType::string(10))];
        let row = types.coerce_row(row, &projection).unwrap();
        assert_eq!(row.get("id"), Some(&Some(Value::I32(3))));
        assert_eq!(row.get("name"), Some(&None));
        assert_eq!(row.get("extra"), Some(&Some(Value::I64(9))));
    }
}
