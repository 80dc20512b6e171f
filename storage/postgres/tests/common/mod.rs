//! Common utilities for Postgres storage tests
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tessera_core::mapping::take_column;
use tessera_core::{ColumnType, ColumnValues, FromValue, Mapper, MappingError, ScalarMapper, Value, ValueType};
use tessera_storage_common::{DriverOptions, SqlStorage};
use tessera_storage_postgres::PostgresDriver;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::{postgres, testcontainers::runners::AsyncRunner};
use tracing::Level;
use uuid::Uuid;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

/// A fresh server. Keep the container alive for the duration of the test.
pub async fn create_postgres_container() -> Result<(ContainerAsync<postgres::Postgres>, String)> {
    let container = postgres::Postgres::default().with_db_name("tessera").with_user("postgres").with_password("postgres").with_tag("16-alpine").start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    Ok((container, format!("host={host} port={port} user=postgres password=postgres dbname=tessera")))
}

pub async fn storage() -> Result<(ContainerAsync<postgres::Postgres>, String, SqlStorage<PostgresDriver>)> {
    storage_with(DriverOptions::default()).await
}

pub async fn storage_with(options: DriverOptions) -> Result<(ContainerAsync<postgres::Postgres>, String, SqlStorage<PostgresDriver>)> {
    let (container, connection_string) = create_postgres_container().await?;
    let storage = SqlStorage::<PostgresDriver>::open_with(&connection_string, options).await?;
    Ok((container, connection_string, storage))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self { Self { name: name.into(), age } }
}

pub struct PersonMapper;

impl Mapper<Person> for PersonMapper {
    fn columns(&self) -> Vec<(String, ColumnType)> { vec![("Name".into(), ColumnType::string(100)), ("Age".into(), ValueType::I32.into())] }

    fn to_values(&self, person: &Person) -> Result<ColumnValues, MappingError> {
        Ok(ColumnValues::from([("Name".to_string(), Some(Value::from(person.name.as_str()))), ("Age".to_string(), Some(Value::I32(person.age)))]))
    }

    fn from_values(&self, values: &mut ColumnValues) -> Result<Person, MappingError> { Ok(Person { name: take_column(values, "Name")?, age: take_column(values, "Age")? }) }
}

/// An order with a server-generated UUID, an exact amount and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer: String,
    pub total: String,
    pub placed: DateTime<Utc>,
}

impl Order {
    pub fn new(customer: &str, total: &str, placed: DateTime<Utc>) -> Self { Self { id: Uuid::nil(), customer: customer.into(), total: total.into(), placed } }
}

pub struct OrderMapper;

impl Mapper<Order> for OrderMapper {
    fn columns(&self) -> Vec<(String, ColumnType)> {
        vec![
            ("Id".into(), ColumnType::identity(ValueType::Guid)),
            ("Customer".into(), ColumnType::string(40)),
            ("Total".into(), ColumnType::decimal(12, 2)),
            ("Placed".into(), ValueType::Timestamp.into()),
        ]
    }

    fn to_values(&self, order: &Order) -> Result<ColumnValues, MappingError> {
        Ok(ColumnValues::from([
            ("Id".to_string(), Some(Value::Guid(order.id))),
            ("Customer".to_string(), Some(Value::from(order.customer.as_str()))),
            ("Total".to_string(), Some(Value::Decimal(order.total.clone()))),
            ("Placed".to_string(), Some(Value::Timestamp(order.placed))),
        ]))
    }

    fn from_values(&self, values: &mut ColumnValues) -> Result<Order, MappingError> {
        Ok(Order {
            id: take_column(values, "Id")?,
            customer: take_column(values, "Customer")?,
            total: take_column(values, "Total")?,
            placed: take_column(values, "Placed")?,
        })
    }

    fn assign(&self, order: &mut Order, column: &str, new: Option<Value>) -> Result<(), MappingError> {
        match column {
            "Id" => {
                order.id = Uuid::from_value(new)?;
                Ok(())
            }
            other => Err(MappingError::NotAssignable(other.to_owned())),
        }
    }
}

pub fn string_key(column: &str) -> Arc<dyn Mapper<String>> { Arc::new(ScalarMapper::<String>::new(column, ColumnType::string(64))) }

pub fn string_value(column: &str) -> Arc<dyn Mapper<String>> { Arc::new(ScalarMapper::<String>::new(column, ValueType::String)) }

pub fn people() -> Arc<dyn Mapper<Person>> { Arc::new(PersonMapper) }

pub fn orders() -> Arc<dyn Mapper<Order>> { Arc::new(OrderMapper) }
