use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A member of the stored value, resolved to a column by the translator.
    Field(String),
    Literal(Value),
    Null,
    /// A `?` in parsed text, awaiting a value from [`Predicate::bind`].
    Placeholder,
    List(Vec<Expr>),
    Call(Call),
}

/// A method call, either on a receiver (`name.contains('x')`) or free-standing (`equals(a, b)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub receiver: Option<Box<Expr>>,
    pub method: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Comparison { left: Box<Expr>, operator: ComparisonOperator, right: Box<Expr> },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    In { expr: Box<Expr>, list: Vec<Expr> },
    Call(Call),
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equal,              // =
    NotEqual,           // <> or !=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
    LessThan,           // <
    LessThanOrEqual,    // <=
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub field: String,
    pub direction: OrderDirection,
}

/// A predicate plus the paging and ordering applied to its matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub predicate: Predicate,
    pub order_by: Vec<OrderByItem>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, other) => other,
            (this, Predicate::True) => this,
            (this, other) => Predicate::And(Box::new(this), Box::new(other)),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate { Predicate::Or(Box::new(self), Box::new(other)) }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate { Predicate::Not(Box::new(self)) }

    /// Replace `?` placeholders, left to right, with the given values. `None` binds a null.
    pub fn bind<I>(self, values: I) -> Result<Predicate, BindError>
    where I: IntoIterator<Item = Option<Value>> {
        let mut values = values.into_iter();
        let mut bound = 0;
        let predicate = self.bind_with(&mut values, &mut bound)?;
        let extra = values.count();
        if extra > 0 {
            return Err(BindError::TooManyValues { expected: bound, got: bound + extra });
        }
        Ok(predicate)
    }

    fn bind_with(self, values: &mut dyn Iterator<Item = Option<Value>>, bound: &mut usize) -> Result<Predicate, BindError> {
        Ok(match self {
            Predicate::Comparison { left, operator, right } => {
                let left = left.bind_with(values, bound)?;
                let right = right.bind_with(values, bound)?;
                Predicate::Comparison { left: Box::new(left), operator, right: Box::new(right) }
            }
            Predicate::And(left, right) => {
                let left = left.bind_with(values, bound)?;
                Predicate::And(Box::new(left), Box::new(right.bind_with(values, bound)?))
            }
            Predicate::Or(left, right) => {
                let left = left.bind_with(values, bound)?;
                Predicate::Or(Box::new(left), Box::new(right.bind_with(values, bound)?))
            }
            Predicate::Not(inner) => Predicate::Not(Box::new(inner.bind_with(values, bound)?)),
            Predicate::In { expr, list } => {
                let expr = expr.bind_with(values, bound)?;
                let list = list.into_iter().map(|e| e.bind_with(values, bound)).collect::<Result<_, _>>()?;
                Predicate::In { expr: Box::new(expr), list }
            }
            Predicate::Call(call) => Predicate::Call(call.bind_with(values, bound)?),
            other @ (Predicate::True | Predicate::False) => other,
        })
    }

    /// Collect the field names referenced anywhere in the predicate.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.walk_fields(&mut fields);
        fields
    }

    fn walk_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Comparison { left, right, .. } => {
                left.walk_fields(out);
                right.walk_fields(out);
            }
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.walk_fields(out);
                right.walk_fields(out);
            }
            Predicate::Not(inner) => inner.walk_fields(out),
            Predicate::In { expr, list } => {
                expr.walk_fields(out);
                list.iter().for_each(|e| e.walk_fields(out));
            }
            Predicate::Call(call) => call.walk_fields(out),
            Predicate::True | Predicate::False => {}
        }
    }
}

impl Expr {
    fn bind_with(self, values: &mut dyn Iterator<Item = Option<Value>>, bound: &mut usize) -> Result<Expr, BindError> {
        Ok(match self {
            Expr::Placeholder => {
                let value = values.next().ok_or(BindError::NotEnoughValues { bound: *bound })?;
                *bound += 1;
                match value {
                    Some(value) => Expr::Literal(value),
                    None => Expr::Null,
                }
            }
            Expr::List(items) => Expr::List(items.into_iter().map(|e| e.bind_with(values, bound)).collect::<Result<_, _>>()?),
            Expr::Call(call) => Expr::Call(call.bind_with(values, bound)?),
            other => other,
        })
    }

    fn walk_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Field(name) => out.push(name),
            Expr::List(items) => items.iter().for_each(|e| e.walk_fields(out)),
            Expr::Call(call) => call.walk_fields(out),
            Expr::Literal(_) | Expr::Null | Expr::Placeholder => {}
        }
    }
}

impl Call {
    fn bind_with(self, values: &mut dyn Iterator<Item = Option<Value>>, bound: &mut usize) -> Result<Call, BindError> {
        let receiver = match self.receiver {
            Some(receiver) => Some(Box::new(receiver.bind_with(values, bound)?)),
            None => None,
        };
        let args = self.args.into_iter().map(|e| e.bind_with(values, bound)).collect::<Result<_, _>>()?;
        Ok(Call { receiver, method: self.method, args })
    }

    fn walk_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(receiver) = &self.receiver {
            receiver.walk_fields(out);
        }
        self.args.iter().for_each(|e| e.walk_fields(out));
    }
}

impl Selection {
    /// Every row, in storage order.
    pub fn all() -> Self { Self::from(Predicate::True) }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(OrderByItem { field: field.into(), direction });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn bind<I>(self, values: I) -> Result<Selection, BindError>
    where I: IntoIterator<Item = Option<Value>> {
        Ok(Selection { predicate: self.predicate.bind(values)?, ..self })
    }
}

impl From<Predicate> for Selection {
    fn from(predicate: Predicate) -> Self { Selection { predicate, order_by: Vec::new(), skip: None, take: None } }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self { Expr::Literal(value) }
}

impl From<Option<Value>> for Expr {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(value) => Expr::Literal(value),
            None => Expr::Null,
        }
    }
}
