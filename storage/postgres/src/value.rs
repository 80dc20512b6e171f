//! Value conversion in both directions.
//!
//! Parameters are encoded for whatever type Postgres inferred for their placeholder, so a value
//! of a narrower or textual type can still bind. Rows are decoded by column type.

use std::error::Error;
use std::fmt::Write;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tessera_core::{ColumnValues, Value};
use tessera_storage_common::types::text;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::PostgresError;

type BoxError = Box<dyn Error + Sync + Send>;

/// One bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PgValue(pub Option<Value>);

impl PgValue {
    fn mismatch(value: &Value, ty: &Type) -> BoxError { format!("cannot encode {:?} as {}", value.value_type(), ty).into() }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::I16(v) => Some(*v as i64),
        Value::I32(v) => Some(*v as i64),
        Value::I64(v) => Some(*v),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Text form of a value, for textual parameter types.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) | Value::Decimal(s) => s.clone(),
        Value::Guid(g) => g.hyphenated().to_string(),
        Value::Date(d) => d.format(text::DATE_FORMAT).to_string(),
        Value::DateTime(dt) => dt.format(text::DATETIME_FORMAT).to_string(),
        Value::Timestamp(ts) => text::timestamp(ts),
        other => other.to_string(),
    }
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let Some(value) = &self.0 else { return Ok(IsNull::Yes) };
        match *ty {
            Type::BOOL => match value {
                Value::Bool(b) => b.to_sql(ty, out),
                other => integer(other).map(|i| i != 0).ok_or_else(|| Self::mismatch(other, ty))?.to_sql(ty, out),
            },
            Type::INT2 => i16::try_from(integer(value).ok_or_else(|| Self::mismatch(value, ty))?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(integer(value).ok_or_else(|| Self::mismatch(value, ty))?)?.to_sql(ty, out),
            Type::INT8 => integer(value).ok_or_else(|| Self::mismatch(value, ty))?.to_sql(ty, out),
            Type::FLOAT4 | Type::FLOAT8 => {
                let f = match value {
                    Value::F64(f) => *f,
                    Value::Decimal(d) => d.parse()?,
                    other => integer(other).ok_or_else(|| Self::mismatch(other, ty))? as f64,
                };
                if *ty == Type::FLOAT4 {
                    (f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => text_of(value).to_sql(ty, out),
            Type::BYTEA => match value {
                Value::Binary(bytes) => bytes.to_sql(ty, out),
                other => Err(Self::mismatch(other, ty)),
            },
            Type::UUID => match value {
                Value::Guid(g) => g.to_sql(ty, out),
                Value::String(s) => Uuid::parse_str(s)?.to_sql(ty, out),
                other => Err(Self::mismatch(other, ty)),
            },
            Type::DATE => match value {
                Value::Date(d) => d.to_sql(ty, out),
                other => Err(Self::mismatch(other, ty)),
            },
            Type::TIMESTAMP => match value {
                Value::DateTime(dt) => dt.to_sql(ty, out),
                Value::Timestamp(ts) => ts.naive_utc().to_sql(ty, out),
                other => Err(Self::mismatch(other, ty)),
            },
            Type::TIMESTAMPTZ => match value {
                Value::Timestamp(ts) => ts.to_sql(ty, out),
                Value::DateTime(dt) => dt.and_utc().to_sql(ty, out),
                other => Err(Self::mismatch(other, ty)),
            },
            _ => Err(Self::mismatch(value, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool { true }

    to_sql_checked!();
}

/// NUMERIC read in its exact text form.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> { numeric_text(raw).map(NumericText) }

    fn accepts(ty: &Type) -> bool { *ty == Type::NUMERIC }
}

/// Decode the binary NUMERIC format: digit count, weight, sign, display scale, then base-10000
/// digits.
fn numeric_text(raw: &[u8]) -> Result<String, BoxError> {
    let word = |i: usize| -> Result<u16, BoxError> {
        raw.get(i * 2..i * 2 + 2).map(|b| u16::from_be_bytes([b[0], b[1]])).ok_or_else(|| "truncated numeric".into())
    };
    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i64;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    let digits = (0..ndigits).map(|i| word(4 + i)).collect::<Result<Vec<_>, _>>()?;

    match sign {
        0xC000 => return Ok("NaN".into()),
        0xD000 => return Ok("Infinity".into()),
        0xF000 => return Ok("-Infinity".into()),
        _ => {}
    }

    let digit = |i: i64| if i >= 0 { digits.get(i as usize).copied().unwrap_or(0) } else { 0 };
    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit(i))?;
            } else {
                write!(out, "{:04}", digit(i))?;
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit(i))?;
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn column_value(row: &Row, index: usize) -> Result<Option<Value>, PostgresError> {
    let column = &row.columns()[index];
    let ty = column.type_();
    Ok(match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(index)?.map(Value::I16),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(Value::I32),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(Value::I64),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(index)?.map(|f| Value::F64(f as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(Value::F64),
        Type::NUMERIC => row.try_get::<_, Option<NumericText>>(index)?.map(|n| Value::Decimal(n.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row.try_get::<_, Option<String>>(index)?.map(Value::String),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Binary),
        Type::UUID => row.try_get::<_, Option<Uuid>>(index)?.map(Value::Guid),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index)?.map(Value::Date),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(index)?.map(Value::DateTime),
        Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(index)?.map(Value::Timestamp),
        _ => return Err(PostgresError::UnsupportedType { column: column.name().to_owned(), type_name: ty.name().to_owned() }),
    })
}

pub fn read_row(row: &Row) -> Result<ColumnValues, PostgresError> {
    let mut values = ColumnValues::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        values.insert(column.name().to_owned(), column_value(row, index)?);
    }
    Ok(values)
}
