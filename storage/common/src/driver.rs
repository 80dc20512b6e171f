//! The connection seam implemented by each backend crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tessera_core::{ColumnValues, StorageError};

use crate::command::Command;
use crate::dialect::Dialect;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Settings shared by every driver. Backend-specific settings travel in the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Upper bound for one operation, connection checkout included.
    pub command_timeout: Duration,
    pub pool_size: u32,
}

impl Default for DriverOptions {
    fn default() -> Self { Self { command_timeout: DEFAULT_COMMAND_TIMEOUT, pool_size: DEFAULT_POOL_SIZE } }
}

/// Rows of a streaming read. The stream owns its connection and releases it when dropped.
pub type RowStream = BoxStream<'static, Result<ColumnValues, StorageError>>;

#[async_trait]
pub trait SqlConnection: Send + 'static {
    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, command: &Command) -> Result<u64, StorageError>;

    /// Run a statement and buffer every row.
    async fn query(&mut self, command: &Command) -> Result<Vec<ColumnValues>, StorageError>;

    /// Run a statement and hand back its rows as they are produced.
    async fn into_rows(self, command: Command) -> Result<RowStream, StorageError>
    where Self: Sized;

    /// Open a transaction with `statement`. Until [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback), dropping the connection rolls the transaction back.
    async fn begin(&mut self, statement: &Command) -> Result<(), StorageError>;

    async fn commit(&mut self, statement: &Command) -> Result<(), StorageError>;

    async fn rollback(&mut self, statement: &Command) -> Result<(), StorageError>;
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: SqlConnection;

    /// Connection-string fragment that makes a connection read-only.
    const READ_ONLY_MARKER: &'static str;

    async fn open(connection_string: &str) -> Result<Self, StorageError>
    where Self: Sized {
        Self::open_with(connection_string, DriverOptions::default()).await
    }

    async fn open_with(connection_string: &str, options: DriverOptions) -> Result<Self, StorageError>
    where Self: Sized;

    /// `connection_string` with the read-only marker applied.
    fn read_only_connection_string(connection_string: &str) -> String
    where Self: Sized;

    /// Whether `connection_string` already asks for a read-only connection, in any spelling the
    /// driver accepts.
    fn has_read_only_marker(connection_string: &str) -> bool
    where Self: Sized {
        connection_string.to_ascii_lowercase().contains(&Self::READ_ONLY_MARKER.to_ascii_lowercase())
    }

    fn dialect(&self) -> Arc<dyn Dialect>;

    fn command_timeout(&self) -> Duration { DEFAULT_COMMAND_TIMEOUT }

    async fn connect(&self) -> Result<Self::Connection, StorageError>;
}
