//! Fluent construction of predicates.
//!
//! Values passed to the builder are captured when the predicate is built, so a predicate never
//! refers back to the variables it was built from.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::ast::{Call, ComparisonOperator, Expr, Predicate};
use crate::value::Value;

/// Anything that can stand on either side of a comparison.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr { self }
}

impl IntoExpr for FieldRef {
    fn into_expr(self) -> Expr { Expr::Field(self.0) }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr { Expr::Literal(self) }
}

impl<T: IntoExpr> IntoExpr for Option<T> {
    fn into_expr(self) -> Expr {
        match self {
            Some(v) => v.into_expr(),
            None => Expr::Null,
        }
    }
}

macro_rules! impl_into_expr {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Expr { Expr::Literal(Value::from(self)) }
            }
        )*
    };
}

impl_into_expr!(bool, i16, i32, i64, f64, String, &str, &String, Vec<u8>, Uuid, NaiveDate, NaiveDateTime, DateTime<Utc>);

#[derive(Debug, Clone)]
pub struct FieldRef(String);

/// Reference a member of the stored value by name.
pub fn field(name: impl Into<String>) -> FieldRef { FieldRef(name.into()) }

impl FieldRef {
    pub fn name(&self) -> &str { &self.0 }

    fn compare(self, operator: ComparisonOperator, other: impl IntoExpr) -> Predicate {
        Predicate::Comparison { left: Box::new(Expr::Field(self.0)), operator, right: Box::new(other.into_expr()) }
    }

    pub fn eq(self, other: impl IntoExpr) -> Predicate { self.compare(ComparisonOperator::Equal, other) }
    pub fn ne(self, other: impl IntoExpr) -> Predicate { self.compare(ComparisonOperator::NotEqual, other) }
    pub fn gt(self, other: impl IntoExpr) -> Predicate { self.compare(ComparisonOperator::GreaterThan, other) }
    pub fn ge(self, other: impl IntoExpr) -> Predicate { self.compare(ComparisonOperator::GreaterThanOrEqual, other) }
    pub fn lt(self, other: impl IntoExpr) -> Predicate { self.compare(ComparisonOperator::LessThan, other) }
    pub fn le(self, other: impl IntoExpr) -> Predicate { self.compare(ComparisonOperator::LessThanOrEqual, other) }

    pub fn is_null(self) -> Predicate { self.compare(ComparisonOperator::Equal, Expr::Null) }
    pub fn is_not_null(self) -> Predicate { self.compare(ComparisonOperator::NotEqual, Expr::Null) }

    pub fn contains(self, needle: impl Into<String>) -> Predicate { self.string_call("contains", needle.into()) }
    pub fn starts_with(self, prefix: impl Into<String>) -> Predicate { self.string_call("starts_with", prefix.into()) }
    pub fn ends_with(self, suffix: impl Into<String>) -> Predicate { self.string_call("ends_with", suffix.into()) }

    fn string_call(self, method: &str, arg: String) -> Predicate {
        Predicate::Call(Call {
            receiver: Some(Box::new(Expr::Field(self.0))),
            method: method.to_owned(),
            args: vec![Expr::Literal(Value::String(arg))],
        })
    }

    /// Membership in a fixed set of values. An empty set matches nothing.
    pub fn is_in<I, T>(self, values: I) -> Predicate
    where
        I: IntoIterator<Item = T>,
        T: IntoExpr,
    {
        Predicate::In { expr: Box::new(Expr::Field(self.0)), list: values.into_iter().map(IntoExpr::into_expr).collect() }
    }
}
