//! Error types for the SQLite driver

use tessera_core::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Invalid connection string: {0}")]
    Config(String),

    #[error("Missing value for parameter {0}")]
    UnboundParameter(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl SqliteError {
    /// True when SQLite aborted the statement because of `sqlite3_interrupt`.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, SqliteError::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::OperationInterrupted)
    }
}

impl From<SqliteError> for StorageError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Config(message) => StorageError::InvalidArgument(message),
            err if err.is_interrupt() => StorageError::Cancelled,
            err => StorageError::backend(err),
        }
    }
}

impl From<bb8::RunError<SqliteError>> for SqliteError {
    fn from(err: bb8::RunError<SqliteError>) -> Self {
        match err {
            bb8::RunError::User(err) => err,
            bb8::RunError::TimedOut => SqliteError::Pool("timed out waiting for a connection".into()),
        }
    }
}
