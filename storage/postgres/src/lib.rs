//! Postgres backend for the tessera relational engine.
//!
//! Statements run through a bb8 pool of tokio-postgres clients. Named parameters are rewritten to
//! positional ones per statement, and every value is cast to its column type server-side so the
//! same command text works whatever Postgres infers for a placeholder.
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_storage_postgres::PostgresDriver;
//! use tessera_storage_common::{SqlStorage, TableOptions};
//!
//! let storage = SqlStorage::<PostgresDriver>::open("host=localhost user=app dbname=shop").await?;
//! let orders = storage.map(&TableOptions::new("orders").schema("sales"), keys, values)?;
//! ```
//!
//! Exact decimals are read back in their full text form and `NUMERIC` columns sort numerically.

mod dialect;
mod driver;
mod error;
mod params;
mod value;

pub use dialect::PostgresDialect;
pub use driver::{PostgresConnection, PostgresDriver};
pub use error::{error_kind, ErrorKind, PostgresError};
