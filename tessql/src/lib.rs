//! Tessera Query Language
//!
//! A small predicate language over the members of a stored value. Predicates are built either
//! with the fluent [`builder`] or parsed from text with [`parser::parse_selection`], and are
//! lowered to SQL by the storage engines.
//!
//! ```rust,ignore
//! use tessql::builder::field;
//!
//! let by_builder = field("age").ge(21).and(field("name").starts_with("A"));
//! let by_text = tessql::parser::parse_predicate("age >= 21 AND name.starts_with('A')")?;
//! assert_eq!(by_builder, by_text);
//! ```

pub mod ast;
pub mod builder;
pub mod error;
pub mod grammar;
pub mod parser;
pub mod value;

pub use ast::{Call, ComparisonOperator, Expr, OrderByItem, OrderDirection, Predicate, Selection};
pub use builder::{field, FieldRef, IntoExpr};
pub use error::{BindError, ParseError};
pub use parser::{parse_predicate, parse_selection, parse_selection_with};
pub use value::{Value, ValueType};
