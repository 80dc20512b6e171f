use thiserror::Error;

use crate::grammar;

/// Failure to turn query text into a [`Selection`](crate::Selection).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("query text is empty")]
    EmptyExpression,
    #[error("expected {expected}, found {got:?}")]
    UnexpectedRule { expected: &'static str, got: grammar::Rule },
    #[error("cannot read literal {0}")]
    InvalidLiteral(String),
    #[error("{0} operand is missing")]
    MissingOperand(&'static str),
    #[error(transparent)]
    Bind(#[from] BindError),
}

/// Positional values did not line up with the `?` placeholders.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindError {
    #[error("{bound} value(s) bound but more placeholders remain")]
    NotEnoughValues { bound: usize },
    #[error("{got} value(s) supplied for {expected} placeholder(s)")]
    TooManyValues { expected: usize, got: usize },
}

impl From<pest::error::Error<grammar::Rule>> for ParseError {
    fn from(err: pest::error::Error<grammar::Rule>) -> Self { ParseError::SyntaxError(err.to_string()) }
}
