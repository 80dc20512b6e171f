//! The entity-mapping contract.
//!
//! Engines never inspect user types. A [`Mapper`] turns a value into column values and back,
//! and is injected when an engine is built. [`ScalarMapper`] covers the common case of a scalar
//! stored in a single column.

use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::MappingError;
use crate::schema::{ColumnType, ColumnValues};
use crate::{Value, ValueType};

pub trait Mapper<T>: Send + Sync + 'static {
    /// Declared columns, in storage order.
    fn columns(&self) -> Vec<(String, ColumnType)>;

    fn to_values(&self, value: &T) -> Result<ColumnValues, MappingError>;

    /// Build a value from a row. Consumed columns may be removed from `values`.
    fn from_values(&self, values: &mut ColumnValues) -> Result<T, MappingError>;

    /// Write a database-generated value (an identity) back onto an in-memory value.
    fn assign(&self, _value: &mut T, column: &str, _new: Option<Value>) -> Result<(), MappingError> {
        Err(MappingError::NotAssignable(column.to_owned()))
    }
}

/// Conversion from a stored value back into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError>;
}

pub fn take_column<T: FromValue>(values: &mut ColumnValues, column: &str) -> Result<T, MappingError> {
    let value = values.shift_remove(column).ok_or_else(|| MappingError::MissingColumn(column.to_owned()))?;
    T::from_value(value).map_err(|err| match err {
        MappingError::UnexpectedNull { .. } => MappingError::UnexpectedNull { column: column.to_owned() },
        other => other,
    })
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
        match value {
            None => Ok(None),
            some => T::from_value(some).map(Some),
        }
    }
}

fn required(value: Option<Value>) -> Result<Value, MappingError> { value.ok_or(MappingError::UnexpectedNull { column: String::new() }) }

fn mismatch(value: &Value, to: ValueType) -> MappingError { MappingError::Conversion { from: value.value_type(), to } }

macro_rules! impl_from_value_int {
    ($ty:ty, $target:ident) => {
        impl FromValue for $ty {
            fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
                match required(value)? {
                    Value::I16(v) => <$ty>::try_from(v).map_err(|_| MappingError::OutOfRange(ValueType::$target)),
                    Value::I32(v) => <$ty>::try_from(v).map_err(|_| MappingError::OutOfRange(ValueType::$target)),
                    Value::I64(v) => <$ty>::try_from(v).map_err(|_| MappingError::OutOfRange(ValueType::$target)),
                    other => Err(mismatch(&other, ValueType::$target)),
                }
            }
        }
    };
}

impl_from_value_int!(i16, I16);
impl_from_value_int!(i32, I32);
impl_from_value_int!(i64, I64);

impl FromValue for f64 {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
        match required(value)? {
            Value::F64(v) => Ok(v),
            Value::I16(v) => Ok(v as f64),
            Value::I32(v) => Ok(v as f64),
            Value::I64(v) => Ok(v as f64),
            Value::Decimal(d) => d.parse().map_err(|_| MappingError::InvalidText { text: d, expected: ValueType::F64 }),
            other => Err(mismatch(&other, ValueType::F64)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
        match required(value)? {
            Value::Bool(b) => Ok(b),
            Value::I64(v) => Ok(v != 0),
            other => Err(mismatch(&other, ValueType::Bool)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
        match required(value)? {
            Value::String(s) | Value::Decimal(s) => Ok(s),
            other => Err(mismatch(&other, ValueType::String)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
        match required(value)? {
            Value::Binary(b) => Ok(b),
            other => Err(mismatch(&other, ValueType::Binary)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Option<Value>) -> Result<Self, MappingError> { required(value) }
}

macro_rules! impl_from_value_exact {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            fn from_value(value: Option<Value>) -> Result<Self, MappingError> {
                match required(value)? {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch(&other, ValueType::$variant)),
                }
            }
        }
    };
}

impl_from_value_exact!(Uuid, Guid);
impl_from_value_exact!(NaiveDate, Date);
impl_from_value_exact!(NaiveDateTime, DateTime);
impl_from_value_exact!(DateTime<Utc>, Timestamp);

/// Maps a scalar onto one column.
pub struct ScalarMapper<T> {
    column: String,
    column_type: ColumnType,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScalarMapper<T> {
    pub fn new(column: impl Into<String>, column_type: impl Into<ColumnType>) -> Self {
        Self { column: column.into(), column_type: column_type.into(), _marker: PhantomData }
    }
}

impl<T> Mapper<T> for ScalarMapper<T>
where T: Clone + Into<Value> + FromValue + Send + Sync + 'static
{
    fn columns(&self) -> Vec<(String, ColumnType)> { vec![(self.column.clone(), self.column_type.clone())] }

    fn to_values(&self, value: &T) -> Result<ColumnValues, MappingError> {
        let mut values = ColumnValues::new();
        values.insert(self.column.clone(), Some(value.clone().into()));
        Ok(values)
    }

    fn from_values(&self, values: &mut ColumnValues) -> Result<T, MappingError> { take_column(values, &self.column) }

    fn assign(&self, value: &mut T, column: &str, new: Option<Value>) -> Result<(), MappingError> {
        if column != self.column {
            return Err(MappingError::NotAssignable(column.to_owned()));
        }
        *value = T::from_value(new)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mapper = ScalarMapper::<String>::new("Value", ColumnType::string(20));
        let mut values = mapper.to_values(&"hello".to_string()).unwrap();
        assert_eq!(values.get("Value"), Some(&Some(Value::from("hello"))));
        assert_eq!(mapper.from_values(&mut values).unwrap(), "hello");
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(i32::from_value(Some(Value::I64(7))).unwrap(), 7);
        assert_eq!(i16::from_value(Some(Value::I64(70_000))), Err(MappingError::OutOfRange(ValueType::I16)));
        assert_eq!(Option::<i32>::from_value(None).unwrap(), None);
    }

    #[test]
    fn test_null_reports_column() {
        let mut values = ColumnValues::new();
        values.insert("count".into(), None);
        let err = take_column::<i32>(&mut values, "count").unwrap_err();
        assert_eq!(err, MappingError::UnexpectedNull { column: "count".into() });
    }
}
