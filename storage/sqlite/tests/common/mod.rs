#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use tessera_core::mapping::take_column;
use tessera_core::{ColumnType, ColumnValues, FromValue, Mapper, MappingError, ScalarMapper, Value, ValueType};
use tessera_storage_common::SqlStorage;
use tessera_storage_sqlite::SqliteDriver;
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    // if LOG_LEVEL env var is set, use it
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self { Self { name: name.into(), age, email: None } }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.into());
        self
    }
}

pub struct PersonMapper;

impl Mapper<Person> for PersonMapper {
    fn columns(&self) -> Vec<(String, ColumnType)> {
        vec![("Name".into(), ColumnType::string(100)), ("Age".into(), ValueType::I32.into()), ("Email".into(), ColumnType::string(200))]
    }

    fn to_values(&self, person: &Person) -> Result<ColumnValues, MappingError> {
        Ok(ColumnValues::from([
            ("Name".to_string(), Some(Value::from(person.name.as_str()))),
            ("Age".to_string(), Some(Value::I32(person.age))),
            ("Email".to_string(), person.email.as_deref().map(Value::from)),
        ]))
    }

    fn from_values(&self, values: &mut ColumnValues) -> Result<Person, MappingError> {
        Ok(Person { name: take_column(values, "Name")?, age: take_column(values, "Age")?, email: take_column(values, "Email")? })
    }
}

/// A row with a database-generated identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub kind: String,
    pub payload: String,
}

impl Event {
    pub fn new(kind: &str, payload: &str) -> Self { Self { id: 0, kind: kind.into(), payload: payload.into() } }
}

pub struct EventMapper;

impl Mapper<Event> for EventMapper {
    fn columns(&self) -> Vec<(String, ColumnType)> {
        vec![("Id".into(), ColumnType::identity(ValueType::I64)), ("Kind".into(), ColumnType::string(20)), ("Payload".into(), ValueType::String.into())]
    }

    fn to_values(&self, event: &Event) -> Result<ColumnValues, MappingError> {
        Ok(ColumnValues::from([
            ("Id".to_string(), Some(Value::I64(event.id))),
            ("Kind".to_string(), Some(Value::from(event.kind.as_str()))),
            ("Payload".to_string(), Some(Value::from(event.payload.as_str()))),
        ]))
    }

    fn from_values(&self, values: &mut ColumnValues) -> Result<Event, MappingError> {
        Ok(Event { id: take_column(values, "Id")?, kind: take_column(values, "Kind")?, payload: take_column(values, "Payload")? })
    }

    fn assign(&self, event: &mut Event, column: &str, new: Option<Value>) -> Result<(), MappingError> {
        match column {
            "Id" => {
                event.id = i64::from_value(new)?;
                Ok(())
            }
            other => Err(MappingError::NotAssignable(other.to_owned())),
        }
    }
}

pub fn string_key(column: &str) -> Arc<dyn Mapper<String>> { Arc::new(ScalarMapper::<String>::new(column, ColumnType::string(64))) }

pub fn string_value(column: &str) -> Arc<dyn Mapper<String>> { Arc::new(ScalarMapper::<String>::new(column, ValueType::String)) }

pub fn people() -> Arc<dyn Mapper<Person>> { Arc::new(PersonMapper) }

pub fn events() -> Arc<dyn Mapper<Event>> { Arc::new(EventMapper) }

pub async fn memory() -> anyhow::Result<SqlStorage<SqliteDriver>> { Ok(SqlStorage::new(Arc::new(SqliteDriver::memory().await?))) }

/// A file-backed database in a fresh temporary directory. Keep the directory alive for the test.
pub async fn on_disk() -> anyhow::Result<(tempfile::TempDir, String, SqlStorage<SqliteDriver>)> {
    let dir = tempfile::tempdir()?;
    let connection_string = dir.path().join("tessera.db").to_string_lossy().into_owned();
    let storage = SqlStorage::<SqliteDriver>::open(&connection_string).await?;
    Ok((dir, connection_string, storage))
}
