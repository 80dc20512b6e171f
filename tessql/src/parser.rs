use pest::iterators::Pair;
use pest::Parser;
use tracing::trace;

use crate::ast::{Call, ComparisonOperator, Expr, OrderByItem, OrderDirection, Predicate, Selection};
use crate::error::ParseError;
use crate::grammar::{Rule, TessqlParser};
use crate::value::Value;

/// Parse a predicate with optional `ORDER BY`, `LIMIT` and `OFFSET` clauses.
pub fn parse_selection(input: &str) -> Result<Selection, ParseError> {
    let mut pairs = TessqlParser::parse(Rule::Selection, input)?;
    let selection = pairs.next().ok_or(ParseError::EmptyExpression)?;
    trace!("parse_selection: {:?}", selection);

    let mut predicate = None;
    let mut order_by = Vec::new();
    let mut skip = None;
    let mut take = None;
    for pair in selection.into_inner() {
        match pair.as_rule() {
            Rule::Expr => predicate = Some(parse_expr(pair)?),
            Rule::OrderByClause => {
                for item in pair.into_inner().filter(|p| p.as_rule() == Rule::OrderByItem) {
                    order_by.push(parse_order_by_item(item)?);
                }
            }
            Rule::LimitClause => take = Some(parse_unsigned(pair)?),
            Rule::OffsetClause => skip = Some(parse_unsigned(pair)?),
            Rule::EOI => {}
            other => return Err(ParseError::UnexpectedRule { expected: "Expr or clause", got: other }),
        }
    }

    Ok(Selection { predicate: predicate.ok_or(ParseError::EmptyExpression)?, order_by, skip, take })
}

/// Parse a bare predicate. Trailing clauses are rejected.
pub fn parse_predicate(input: &str) -> Result<Predicate, ParseError> {
    let selection = parse_selection(input)?;
    if !selection.order_by.is_empty() || selection.skip.is_some() || selection.take.is_some() {
        return Err(ParseError::SyntaxError(format!("unexpected ordering or paging clause in predicate: {}", input)));
    }
    Ok(selection.predicate)
}

/// Parse and bind `?` placeholders in one step.
pub fn parse_selection_with<I>(input: &str, values: I) -> Result<Selection, ParseError>
where I: IntoIterator<Item = Option<Value>> {
    Ok(parse_selection(input)?.bind(values)?)
}

fn parse_expr(pair: Pair<Rule>) -> Result<Predicate, ParseError> {
    let mut terms = pair.into_inner().filter(|p| p.as_rule() == Rule::Conjunction);
    let first = terms.next().ok_or(ParseError::MissingOperand("first"))?;
    let mut result = parse_conjunction(first)?;
    for next in terms {
        result = Predicate::Or(Box::new(result), Box::new(parse_conjunction(next)?));
    }
    Ok(result)
}

fn parse_conjunction(pair: Pair<Rule>) -> Result<Predicate, ParseError> {
    let mut terms = pair.into_inner().filter(|p| p.as_rule() == Rule::Negation);
    let first = terms.next().ok_or(ParseError::MissingOperand("first"))?;
    let mut result = parse_negation(first)?;
    for next in terms {
        result = Predicate::And(Box::new(result), Box::new(parse_negation(next)?));
    }
    Ok(result)
}

fn parse_negation(pair: Pair<Rule>) -> Result<Predicate, ParseError> {
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or(ParseError::EmptyExpression)?;
    match first.as_rule() {
        Rule::Not => {
            let operand = inner.next().ok_or(ParseError::MissingOperand("negated"))?;
            Ok(Predicate::Not(Box::new(parse_negation(operand)?)))
        }
        _ => parse_term(first),
    }
}

fn parse_term(pair: Pair<Rule>) -> Result<Predicate, ParseError> {
    match pair.as_rule() {
        Rule::Parenthesized => {
            let expr = pair.into_inner().next().ok_or(ParseError::EmptyExpression)?;
            parse_expr(expr)
        }
        Rule::Comparison => {
            let mut inner = pair.into_inner();
            let left = parse_operand(inner.next().ok_or(ParseError::MissingOperand("left"))?)?;
            let op = inner.next().ok_or(ParseError::MissingOperand("operator"))?;
            let right = parse_operand(inner.next().ok_or(ParseError::MissingOperand("right"))?)?;
            let operator = match op.as_rule() {
                Rule::Eq => ComparisonOperator::Equal,
                Rule::NotEq => ComparisonOperator::NotEqual,
                Rule::Gt => ComparisonOperator::GreaterThan,
                Rule::GtEq => ComparisonOperator::GreaterThanOrEqual,
                Rule::Lt => ComparisonOperator::LessThan,
                Rule::LtEq => ComparisonOperator::LessThanOrEqual,
                other => return Err(ParseError::UnexpectedRule { expected: "comparison operator", got: other }),
            };
            Ok(Predicate::Comparison { left: Box::new(left), operator, right: Box::new(right) })
        }
        Rule::IsNull => {
            // x IS [NOT] NULL is the same thing as x = NULL / x <> NULL
            let mut inner = pair.into_inner();
            let operand = parse_operand(inner.next().ok_or(ParseError::MissingOperand("left"))?)?;
            let negated = inner.any(|p| p.as_rule() == Rule::Not);
            let operator = if negated { ComparisonOperator::NotEqual } else { ComparisonOperator::Equal };
            Ok(Predicate::Comparison { left: Box::new(operand), operator, right: Box::new(Expr::Null) })
        }
        Rule::InList => {
            let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::In);
            let expr = parse_operand(inner.next().ok_or(ParseError::MissingOperand("left"))?)?;
            let list = inner.next().ok_or(ParseError::MissingOperand("list"))?;
            let list = list.into_inner().map(parse_operand).collect::<Result<Vec<_>, _>>()?;
            Ok(Predicate::In { expr: Box::new(expr), list })
        }
        Rule::Call => Ok(Predicate::Call(parse_call(pair)?)),
        Rule::True => Ok(Predicate::True),
        Rule::False => Ok(Predicate::False),
        other => Err(ParseError::UnexpectedRule { expected: "predicate", got: other }),
    }
}

fn parse_call(pair: Pair<Rule>) -> Result<Call, ParseError> {
    let mut receiver = None;
    let mut method = None;
    let mut args = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            // the method name is the only bare Identifier; a field receiver is wrapped in Field
            Rule::Identifier if method.is_none() => method = Some(part.as_str().to_owned()),
            _ if method.is_none() => receiver = Some(Box::new(parse_operand(part)?)),
            _ => args.push(parse_operand(part)?),
        }
    }
    let method = method.ok_or(ParseError::MissingOperand("method"))?;
    Ok(Call { receiver, method, args })
}

fn parse_operand(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::Field => {
            let identifier = pair.into_inner().next().ok_or(ParseError::MissingOperand("field"))?;
            Ok(Expr::Field(identifier.as_str().to_owned()))
        }
        Rule::Null => Ok(Expr::Null),
        Rule::True => Ok(Expr::Literal(Value::Bool(true))),
        Rule::False => Ok(Expr::Literal(Value::Bool(false))),
        Rule::Integer => {
            let text = pair.as_str();
            let value = text.parse::<i64>().map_err(|_| ParseError::InvalidLiteral(text.to_owned()))?;
            Ok(Expr::Literal(Value::I64(value)))
        }
        Rule::Float => {
            let text = pair.as_str();
            let value = text.parse::<f64>().map_err(|_| ParseError::InvalidLiteral(text.to_owned()))?;
            Ok(Expr::Literal(Value::F64(value)))
        }
        Rule::SingleQuoted => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Ok(Expr::Literal(Value::String(inner.replace("''", "'"))))
        }
        Rule::Placeholder => Ok(Expr::Placeholder),
        Rule::List => Ok(Expr::List(pair.into_inner().map(parse_operand).collect::<Result<_, _>>()?)),
        Rule::Call => Ok(Expr::Call(parse_call(pair)?)),
        other => Err(ParseError::UnexpectedRule { expected: "operand", got: other }),
    }
}

fn parse_order_by_item(pair: Pair<Rule>) -> Result<OrderByItem, ParseError> {
    let mut inner = pair.into_inner();
    let field = inner.next().ok_or(ParseError::MissingOperand("order by field"))?.as_str().to_owned();
    let direction = match inner.next().and_then(|d| d.into_inner().next()).map(|d| d.as_rule()) {
        Some(Rule::Desc) => OrderDirection::Desc,
        _ => OrderDirection::Asc,
    };
    Ok(OrderByItem { field, direction })
}

fn parse_unsigned(pair: Pair<Rule>) -> Result<u64, ParseError> {
    let number = pair.into_inner().find(|p| p.as_rule() == Rule::Unsigned).ok_or(ParseError::MissingOperand("count"))?;
    number.as_str().parse().map_err(|_| ParseError::InvalidLiteral(number.as_str().to_owned()))
}
