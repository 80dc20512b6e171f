use tessera_core::StorageError;
use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Invalid connection string: {0}")]
    Config(String),

    #[error("Missing value for parameter {0}")]
    UnboundParameter(String),

    #[error("Cannot decode column {column} of type {type_name}")]
    UnsupportedType { column: String, type_name: String },

    #[error("Connection already released")]
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    RowCount,
    UndefinedTable { table: String },
    UndefinedColumn { table: Option<String>, column: String },
    UniqueViolation,
    QueryCanceled,
    ReadOnlyTransaction,
    Unknown,
}

pub fn error_kind(err: &tokio_postgres::Error) -> ErrorKind {
    let message = err.as_db_error().map(|db| db.message().to_owned()).unwrap_or_else(|| err.to_string().trim().to_owned());

    if message == "query returned an unexpected number of rows" {
        return ErrorKind::RowCount;
    }

    // quoted names in order of appearance
    let quoted: Vec<&str> = message.split('"').skip(1).step_by(2).collect();

    match err.code() {
        // relation "album" does not exist
        Some(code) if *code == SqlState::UNDEFINED_TABLE => ErrorKind::UndefinedTable { table: quoted.first().copied().unwrap_or_default().to_owned() },
        // column "name" of relation "album" does not exist / column "status" does not exist
        Some(code) if *code == SqlState::UNDEFINED_COLUMN => {
            ErrorKind::UndefinedColumn { column: quoted.first().copied().unwrap_or_default().to_owned(), table: quoted.get(1).map(|t| t.to_string()) }
        }
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => ErrorKind::UniqueViolation,
        Some(code) if *code == SqlState::QUERY_CANCELED => ErrorKind::QueryCanceled,
        Some(code) if *code == SqlState::READ_ONLY_SQL_TRANSACTION => ErrorKind::ReadOnlyTransaction,
        _ => ErrorKind::Unknown,
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Config(message) => StorageError::InvalidArgument(message),
            PostgresError::Postgres(ref inner) if error_kind(inner) == ErrorKind::QueryCanceled => StorageError::Cancelled,
            err => StorageError::backend(err),
        }
    }
}

impl From<bb8::RunError<tokio_postgres::Error>> for PostgresError {
    fn from(err: bb8::RunError<tokio_postgres::Error>) -> Self {
        match err {
            bb8::RunError::User(err) => PostgresError::Postgres(err),
            bb8::RunError::TimedOut => PostgresError::Pool("timed out waiting for a connection".into()),
        }
    }
}
