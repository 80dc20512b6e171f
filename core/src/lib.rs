pub mod collections;
pub mod error;
pub mod mapping;
pub mod query;
pub mod schema;

pub use tessql;
pub use tessql::{Value, ValueType};

pub use error::{MappingError, PredicateError, StorageError};
pub use mapping::{FromValue, Mapper, ScalarMapper};
pub use query::{QueryOptions, QueryResult};
pub use schema::{sane_name, ColumnType, ColumnValues, TableDescriptor};
