//! Named placeholders to Postgres positional ones.
//!
//! Commands reference parameters as `:name` (or `@name`). Postgres wants `$1`, `$2`, ... so the
//! text is rewritten once per statement, skipping quoted literals, quoted identifiers and `::` casts.
//! A name used twice maps to the same position.

use tessera_core::Value;
use tessera_storage_common::Parameters;

use crate::error::PostgresError;

/// Rewritten SQL with its values in positional order.
#[derive(Debug, Clone, PartialEq)]
pub struct Positional {
    pub sql: String,
    pub values: Vec<Option<Value>>,
}

pub fn to_positional(sql: &str, parameters: &Parameters) -> Result<Positional, PostgresError> {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<&str> = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(c);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    // a doubled quote re-enters the literal on the next iteration
                    if inner == c {
                        break;
                    }
                }
            }
            ':' if chars.peek().is_some_and(|(_, next)| *next == ':') => {
                out.push_str("::");
                chars.next();
            }
            ':' | '@' if chars.peek().is_some_and(|(_, next)| next.is_ascii_alphabetic() || *next == '_') => {
                let start = index + 1;
                let mut end = start;
                while let Some((i, next)) = chars.peek().copied() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                let name = &sql[start..end];
                let position = match names.iter().position(|n| *n == name) {
                    Some(position) => position,
                    None => {
                        names.push(name);
                        names.len() - 1
                    }
                };
                out.push('$');
                out.push_str(&(position + 1).to_string());
            }
            c => out.push(c),
        }
    }

    let values = names
        .into_iter()
        .map(|name| parameters.get(name).cloned().ok_or_else(|| PostgresError::UnboundParameter(name.to_owned())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Positional { sql: out, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(names: &[&str]) -> Parameters {
        let mut parameters = Parameters::new();
        for (i, name) in names.iter().enumerate() {
            parameters.set(*name, Some(Value::I64(i as i64)));
        }
        parameters
    }

    #[test]
    fn test_positions_follow_first_use() {
        let p = to_positional(r#"SELECT "a" FROM "t" WHERE "a" = :a AND "b" > :b OR "a" = :a"#, &parameters(&["b", "a"])).unwrap();
        assert_eq!(p.sql, r#"SELECT "a" FROM "t" WHERE "a" = $1 AND "b" > $2 OR "a" = $1"#);
        assert_eq!(p.values, vec![Some(Value::I64(1)), Some(Value::I64(0))]);
    }

    #[test]
    fn test_literals_and_casts_are_left_alone() {
        let sql = r#"SELECT ':nope', "we:ird" FROM t WHERE x LIKE CAST(:x AS TEXT) ESCAPE '\' AND y::text = @y AND z = 'it''s :z'"#;
        let p = to_positional(sql, &parameters(&["x", "y"])).unwrap();
        assert_eq!(p.sql, r#"SELECT ':nope', "we:ird" FROM t WHERE x LIKE CAST($1 AS TEXT) ESCAPE '\' AND y::text = $2 AND z = 'it''s :z'"#);
        assert_eq!(p.values.len(), 2);
    }

    #[test]
    fn test_unbound_name_is_an_error() {
        let err = to_positional("DELETE FROM t WHERE a = :missing", &Parameters::new()).unwrap_err();
        assert!(matches!(err, PostgresError::UnboundParameter(name) if name == "missing"));
    }

    #[test]
    fn test_no_parameters() {
        let p = to_positional("SELECT COUNT(*) FROM t WHERE 1 = 1", &Parameters::new()).unwrap();
        assert_eq!(p.sql, "SELECT COUNT(*) FROM t WHERE 1 = 1");
        assert!(p.values.is_empty());
    }
}
