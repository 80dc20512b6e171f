//! The relational engine shared by the SQL backends.
//!
//! A backend crate supplies a [`Driver`] (connections plus a [`Dialect`]); everything else, from
//! statement templates to the collection engines, lives here.

pub mod builder;
pub mod command;
pub mod dialect;
pub mod driver;
pub mod engine;
pub mod expiration;
pub mod reader;
pub mod replica;
pub mod schema;
pub mod scope;
pub mod storage;
pub mod table;
pub mod template;
pub mod translate;
pub mod types;

pub use builder::{CommandBuilder, SelectOptions};
pub use command::{Command, CommandAugmenter, Draft, Parameters, WhereStatement};
pub use dialect::{Dialect, GenericDialect, IsolationLevel, StatementKind};
pub use driver::{Driver, DriverOptions, RowStream, SqlConnection};
pub use engine::{SchemaAware, SqlKeyedSet, SqlList, SqlMap, SqlSet, SqlSetMap, SqlSortedSet, TableOptions};
pub use expiration::{ExpirationAugmenter, ExpiringSqlMap};
pub use replica::ReadReplica;
pub use schema::SchemaSynchronizer;
pub use scope::OperationScope;
pub use storage::SqlStorage;
pub use table::{SqlTable, Transaction};
pub use translate::Translator;
pub use types::TypeMap;
