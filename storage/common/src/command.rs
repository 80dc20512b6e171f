use indexmap::IndexMap;
use tessera_core::{ColumnType, StorageError, Value};

use crate::dialect::{Dialect, StatementKind};
use crate::template;

/// Named parameter values for one statement. Names are unique within a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: IndexMap<String, Option<Value>>,
}

impl Parameters {
    pub fn new() -> Self { Self::default() }

    /// Add a value under a name derived from `hint`, returning the name actually used.
    pub fn add(&mut self, hint: &str, value: Option<Value>) -> String {
        let base = sanitize(hint);
        let mut name = base.clone();
        let mut counter = 1;
        while self.values.contains_key(&name) {
            name = format!("{}{}", base, counter);
            counter += 1;
        }
        self.values.insert(name.clone(), value);
        name
    }

    /// Set `name` to `value`, replacing any previous value under that exact name.
    pub fn set(&mut self, name: impl Into<String>, value: Option<Value>) { self.values.insert(name.into(), value); }

    pub fn get(&self, name: &str) -> Option<&Option<Value>> { self.values.get(name) }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Value>)> { self.values.iter() }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Merge `other` in, renaming nothing. Callers guarantee names do not collide.
    pub fn extend(&mut self, other: Parameters) { self.values.extend(other.values); }
}

fn sanitize(hint: &str) -> String {
    let mut name: String = hint.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'p');
    }
    name
}

/// An executable statement: SQL text plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: StatementKind,
    pub sql: String,
    pub parameters: Parameters,
    /// Declared types of the result columns, for coercing rows read back.
    pub projection: Vec<(String, ColumnType)>,
}

impl Command {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self { Self { kind, sql: sql.into(), parameters: Parameters::new(), projection: Vec::new() } }
}

/// A WHERE clause body and the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereStatement {
    pub sql: String,
    pub parameters: Parameters,
}

/// A statement before rendering. Augmenters may rewrite fragments and add parameters.
#[derive(Debug, Clone)]
pub struct Draft {
    pub kind: StatementKind,
    pub fragments: IndexMap<&'static str, String>,
    pub parameters: Parameters,
    pub projection: Vec<(String, ColumnType)>,
}

impl Draft {
    pub fn new(kind: StatementKind) -> Self { Self { kind, fragments: IndexMap::new(), parameters: Parameters::new(), projection: Vec::new() } }

    pub fn fragment(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fragments.insert(name, value.into());
        self
    }

    pub fn render(self, dialect: &dyn Dialect) -> Result<Command, StorageError> {
        let Some(template) = dialect.template(self.kind) else {
            return Err(StorageError::argument(format!("{} has no {:?} statement", dialect.name(), self.kind)));
        };
        let substitutions: Vec<(&str, &str)> = self.fragments.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let sql = template::render(template, &substitutions)?;
        Ok(Command { kind: self.kind, sql, parameters: self.parameters, projection: self.projection })
    }
}

/// Hook applied to every statement a builder produces, before rendering.
pub trait CommandAugmenter: Send + Sync + 'static {
    fn augment(&self, draft: &mut Draft, dialect: &dyn Dialect);
}
