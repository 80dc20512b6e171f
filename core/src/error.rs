use std::time::Duration;

use thiserror::Error;

use crate::ValueType;

/// Failures of the storage engines.
///
/// `InvalidArgument` and `UnsupportedPredicate` are caller bugs raised before any I/O.
/// `OperationFailed` means an expected single-row mutation affected no rows. `Cancelled` and
/// `Timeout` are kept apart from everything else so retrying layers can recognise them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(#[from] PredicateError),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("parse error: {0}")]
    Parse(#[from] tessql::error::ParseError),

    #[error("backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StorageError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self { StorageError::Backend(Box::new(err)) }

    pub fn argument(message: impl Into<String>) -> Self { StorageError::InvalidArgument(message.into()) }

    pub fn failed(message: impl Into<String>) -> Self { StorageError::OperationFailed(message.into()) }

    /// True for caller-requested aborts and timeouts.
    pub fn is_cancellation(&self) -> bool { matches!(self, StorageError::Cancelled | StorageError::Timeout(_)) }
}

/// A predicate construct that cannot be lowered to SQL.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredicateError {
    #[error("placeholder found in predicate - bind values before querying")]
    PlaceholderFound,
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(&'static str),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("ordering by more than one member is not supported")]
    MultiMemberOrderBy,
    #[error("cannot use {value} as {expected}")]
    InvalidLiteral { value: String, expected: ValueType },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    #[error("missing column {0}")]
    MissingColumn(String),
    #[error("column {column} is null")]
    UnexpectedNull { column: String },
    #[error("cannot convert {from} to {to}")]
    Conversion { from: ValueType, to: ValueType },
    #[error("value out of range for {0}")]
    OutOfRange(ValueType),
    #[error("invalid {expected} text: {text}")]
    InvalidText { text: String, expected: ValueType },
    #[error("column {0} cannot be assigned")]
    NotAssignable(String),
}
