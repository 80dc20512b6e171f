//! SQLite backend for the tessera relational engine.
//!
//! Embedded, single-file storage with no server to run. Statements execute on the blocking thread
//! pool through a bb8 pool of rusqlite connections; an abandoned statement is stopped with
//! `sqlite3_interrupt`.
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_storage_sqlite::SqliteDriver;
//! use tessera_storage_common::{SqlStorage, TableOptions};
//!
//! let storage = SqlStorage::<SqliteDriver>::open("app.db;busy_timeout_ms=2000").await?;
//! let users = storage.map(&TableOptions::new("users"), keys, values)?;
//! users.try_add(&id, &user, false).await?;
//! ```
//!
//! Use `:memory:` for a private in-memory database. Such a database lives in a single pooled
//! connection, so at most one operation (or open result stream) runs at a time.

mod config;
mod connection;
mod dialect;
mod driver;
mod error;
mod value;

pub use config::{SqliteConfig, SqliteTarget};
pub use connection::SqliteConnectionManager;
pub use dialect::SqliteDialect;
pub use driver::{SqliteConnection, SqliteDriver};
pub use error::SqliteError;
