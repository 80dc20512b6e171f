//! Lowering of [`Predicate`] trees to dialect WHERE clauses.
//!
//! Fields resolve to columns of the table (through an optional alias table, so `key` and `value`
//! can name a map's columns). Literals become named parameters coerced to the type of the column
//! they are compared against; no value is ever spliced into the SQL text.

use std::collections::HashMap;

use tessera_core::{ColumnType, PredicateError, StorageError, TableDescriptor, Value};
use tessql::{Call, ComparisonOperator, Expr, OrderByItem, OrderDirection, Predicate};

use crate::command::{Parameters, WhereStatement};
use crate::dialect::{Dialect, StatementKind};
use crate::template::render;
use crate::types::TypeMap;

/// Predicate field name to column name.
pub type Aliases = HashMap<String, String>;

pub struct Translator<'a> {
    dialect: &'a dyn Dialect,
    types: &'a TypeMap,
    table: &'a TableDescriptor,
    aliases: Option<&'a Aliases>,
}

struct Column<'a> {
    name: &'a str,
    column_type: &'a ColumnType,
}

enum Operand<'a> {
    Column(Column<'a>),
    Value(Option<Value>),
    List(&'a [Expr]),
}

impl<'a> Translator<'a> {
    pub fn new(dialect: &'a dyn Dialect, types: &'a TypeMap, table: &'a TableDescriptor) -> Self { Self { dialect, types, table, aliases: None } }

    pub fn with_aliases(mut self, aliases: &'a Aliases) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn translate(&self, predicate: &Predicate) -> Result<WhereStatement, StorageError> {
        let mut parameters = Parameters::new();
        let sql = self.predicate(predicate, &mut parameters)?;
        Ok(WhereStatement { sql, parameters })
    }

    /// Translate into an existing parameter collection so names stay unique across fragments.
    pub fn predicate(&self, predicate: &Predicate, parameters: &mut Parameters) -> Result<String, StorageError> {
        match predicate {
            Predicate::Comparison { left, operator, right } => self.comparison(left, *operator, right, parameters),
            Predicate::And(left, right) => {
                let left = self.predicate(left, parameters)?;
                let right = self.predicate(right, parameters)?;
                self.render(StatementKind::And, &[("left", &left), ("right", &right)])
            }
            Predicate::Or(left, right) => {
                let left = self.predicate(left, parameters)?;
                let right = self.predicate(right, parameters)?;
                self.render(StatementKind::Or, &[("left", &left), ("right", &right)])
            }
            Predicate::Not(inner) => {
                let operand = self.predicate(inner, parameters)?;
                self.render(StatementKind::Not, &[("operand", &operand)])
            }
            Predicate::In { expr, list } => self.in_list(expr, list, parameters),
            Predicate::Call(call) => self.call(call, parameters),
            Predicate::True => self.render(StatementKind::AlwaysTrue, &[]),
            Predicate::False => self.render(StatementKind::AlwaysFalse, &[]),
        }
    }

    /// `" ORDER BY ..."`, or an empty string when nothing is ordered.
    pub fn order_by(&self, items: &[OrderByItem]) -> Result<String, StorageError> {
        let item = match items {
            [] => return Ok(String::new()),
            [item] => item,
            _ => return Err(PredicateError::MultiMemberOrderBy.into()),
        };
        let column = self.column(&item.field)?;
        let mut sql = self.dialect.quote_identifier(column.name);
        if item.direction == OrderDirection::Desc {
            sql = self.render(StatementKind::Descending, &[("column", &sql)])?;
        }
        self.render(StatementKind::OrderBy, &[("columns", &sql)])
    }

    /// Resolve a predicate field to a declared column: alias first, then exact, then case-insensitive.
    fn column(&self, field: &str) -> Result<Column<'a>, PredicateError> {
        let name = self.aliases.and_then(|a| a.get(field)).map(String::as_str).unwrap_or(field);
        let found = self.table.columns().get_key_value(name).or_else(|| self.table.columns().iter().find(|(c, _)| c.eq_ignore_ascii_case(name)));
        match found {
            Some((name, column_type)) => Ok(Column { name, column_type }),
            None => Err(PredicateError::UnknownField(field.to_owned())),
        }
    }

    fn operand(&self, expr: &'a Expr) -> Result<Operand<'a>, PredicateError> {
        match expr {
            Expr::Field(name) => Ok(Operand::Column(self.column(name)?)),
            Expr::Literal(value) => Ok(Operand::Value(Some(value.clone()))),
            Expr::Null => Ok(Operand::Value(None)),
            Expr::Placeholder => Err(PredicateError::PlaceholderFound),
            Expr::List(items) => Ok(Operand::List(items)),
            Expr::Call(call) => match (method_key(&call.method).as_str(), call.receiver.as_deref(), call.args.as_slice()) {
                // to_string is transparent
                ("tostring", Some(receiver), []) => self.operand(receiver),
                ("tostring", None, [arg]) => self.operand(arg),
                _ => Err(PredicateError::UnsupportedMethod(call.method.clone())),
            },
        }
    }

    /// SQL for an operand. Values are bound as parameters, coerced to `against` when given.
    fn value_sql(&self, operand: Operand<'_>, against: Option<&Column<'_>>, parameters: &mut Parameters) -> Result<String, StorageError> {
        match operand {
            Operand::Column(column) => Ok(self.dialect.quote_identifier(column.name)),
            Operand::Value(value) => {
                let value = match (value, against) {
                    (Some(value), Some(column)) => Some(self.types.coerce(value.clone(), column.column_type).map_err(|_| {
                        PredicateError::InvalidLiteral { value: value.to_string(), expected: column.column_type.base }
                    })?),
                    (value, _) => value,
                };
                let name = parameters.add(against.map(|c| c.name).unwrap_or("p"), value);
                Ok(self.dialect.value_expression(&self.dialect.parameter_name(&name), against.map(|c| c.column_type)))
            }
            Operand::List(_) => Err(PredicateError::UnsupportedExpression("a list is only valid as the right side of IN").into()),
        }
    }

    fn comparison(&self, left: &'a Expr, operator: ComparisonOperator, right: &'a Expr, parameters: &mut Parameters) -> Result<String, StorageError> {
        let left = self.operand(left)?;
        let right = self.operand(right)?;

        let null_test = match (&left, &right) {
            (_, Operand::Value(None)) => Some(false),
            (Operand::Value(None), _) => Some(true),
            _ => None,
        };
        if let Some(null_on_left) = null_test {
            let kind = match operator {
                ComparisonOperator::Equal => StatementKind::IsNull,
                ComparisonOperator::NotEqual => StatementKind::IsNotNull,
                _ => return Err(PredicateError::UnsupportedExpression("ordering comparison against null").into()),
            };
            let other = if null_on_left { right } else { left };
            let operand = self.value_sql(other, None, parameters)?;
            return self.render(kind, &[("operand", &operand)]);
        }

        let kind = match operator {
            ComparisonOperator::Equal => StatementKind::Equal,
            ComparisonOperator::NotEqual => StatementKind::NotEqual,
            ComparisonOperator::GreaterThan => StatementKind::GreaterThan,
            ComparisonOperator::GreaterThanOrEqual => StatementKind::GreaterThanOrEqual,
            ComparisonOperator::LessThan => StatementKind::LessThan,
            ComparisonOperator::LessThanOrEqual => StatementKind::LessThanOrEqual,
        };
        let (left_sql, right_sql) = match (left, right) {
            (Operand::Column(l), Operand::Column(r)) => (self.dialect.quote_identifier(l.name), self.dialect.quote_identifier(r.name)),
            (Operand::Column(column), value) => {
                let value = self.value_sql(value, Some(&column), parameters)?;
                (self.dialect.quote_identifier(column.name), value)
            }
            (value, Operand::Column(column)) => {
                let value = self.value_sql(value, Some(&column), parameters)?;
                (value, self.dialect.quote_identifier(column.name))
            }
            (l, r) => (self.value_sql(l, None, parameters)?, self.value_sql(r, None, parameters)?),
        };
        self.render(kind, &[("left", &left_sql), ("right", &right_sql)])
    }

    fn in_list(&self, expr: &'a Expr, list: &'a [Expr], parameters: &mut Parameters) -> Result<String, StorageError> {
        if list.is_empty() {
            return self.render(StatementKind::AlwaysFalse, &[]);
        }
        let (operand_sql, column) = match self.operand(expr)? {
            Operand::Column(column) => (self.dialect.quote_identifier(column.name), Some(column)),
            other => (self.value_sql(other, None, parameters)?, None),
        };
        let mut items = Vec::with_capacity(list.len());
        for item in list {
            let item = self.operand(item)?;
            items.push(self.value_sql(item, column.as_ref(), parameters)?);
        }
        self.render(StatementKind::In, &[("operand", &operand_sql), ("list", &items.join(", "))])
    }

    fn call(&self, call: &'a Call, parameters: &mut Parameters) -> Result<String, StorageError> {
        let method = method_key(&call.method);
        match (method.as_str(), call.receiver.as_deref(), call.args.as_slice()) {
            ("contains", Some(Expr::List(items)), [item]) => self.in_list(item, items, parameters),
            ("contains", None, [Expr::List(items), item]) => self.in_list(item, items, parameters),
            ("contains" | "startswith" | "endswith", Some(receiver), [pattern]) => {
                let pattern = match self.operand(pattern)? {
                    Operand::Value(Some(Value::String(s))) => s,
                    _ => return Err(PredicateError::UnsupportedExpression("pattern argument must be a string literal").into()),
                };
                let escaped = escape_like(&pattern);
                let pattern = match method.as_str() {
                    "contains" => format!("%{}%", escaped),
                    "startswith" => format!("{}%", escaped),
                    _ => format!("%{}", escaped),
                };
                let (left, hint) = match self.operand(receiver)? {
                    Operand::Column(column) => (self.dialect.quote_identifier(column.name), column.name),
                    _ => return Err(PredicateError::UnsupportedExpression("pattern match on a non-column").into()),
                };
                // bound untyped so a pattern longer than the column is not truncated by a cast
                let name = parameters.add(hint, Some(Value::String(pattern)));
                let right = self.dialect.value_expression(&self.dialect.parameter_name(&name), None);
                self.render(StatementKind::Like, &[("left", &left), ("right", &right)])
            }
            ("equals", Some(receiver), [other]) => self.comparison(receiver, ComparisonOperator::Equal, other, parameters),
            ("equals", None, [left, right]) => self.comparison(left, ComparisonOperator::Equal, right, parameters),
            _ => Err(PredicateError::UnsupportedMethod(call.method.clone()).into()),
        }
    }

    fn render(&self, kind: StatementKind, substitutions: &[(&str, &str)]) -> Result<String, StorageError> {
        match self.dialect.template(kind) {
            Some(template) => render(template, substitutions),
            None => Err(StorageError::argument(format!("{} has no {:?} operator", self.dialect.name(), kind))),
        }
    }
}

/// `starts_with`, `StartsWith` and `startswith` all name the same method.
fn method_key(method: &str) -> String { method.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect() }

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
