use indexmap::IndexMap;

use crate::error::StorageError;
use crate::{Value, ValueType};

/// Column name to value (or null) for one row.
pub type ColumnValues = IndexMap<String, Option<Value>>;

/// Names end up quoted inside SQL text, so only a conservative character set is accepted.
pub fn sane_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub base: ValueType,
    pub length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    /// Generated by the database on insert, never supplied by the caller.
    pub identity: bool,
}

impl ColumnType {
    pub fn new(base: ValueType) -> Self { Self { base, length: None, precision: None, scale: None, identity: false } }

    pub fn string(length: u32) -> Self { Self { length: Some(length), ..Self::new(ValueType::String) } }

    pub fn decimal(precision: u8, scale: u8) -> Self { Self { precision: Some(precision), scale: Some(scale), ..Self::new(ValueType::Decimal) } }

    pub fn identity(base: ValueType) -> Self { Self { identity: true, ..Self::new(base) } }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }
}

impl From<ValueType> for ColumnType {
    fn from(base: ValueType) -> Self { ColumnType::new(base) }
}

/// The declared shape of one table. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    schema: Option<String>,
    name: String,
    key_columns: Vec<String>,
    columns: IndexMap<String, ColumnType>,
    synchronize_schema: bool,
}

impl TableDescriptor {
    pub fn builder(name: impl Into<String>) -> TableDescriptorBuilder {
        TableDescriptorBuilder { schema: None, name: name.into(), key_columns: Vec::new(), columns: IndexMap::new(), synchronize_schema: true }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn schema(&self) -> Option<&str> { self.schema.as_deref() }

    pub fn key_columns(&self) -> &[String] { &self.key_columns }

    pub fn columns(&self) -> &IndexMap<String, ColumnType> { &self.columns }

    pub fn column(&self, name: &str) -> Option<&ColumnType> { self.columns.get(name) }

    pub fn is_key(&self, name: &str) -> bool { self.key_columns.iter().any(|k| k == name) }

    pub fn synchronize_schema(&self) -> bool { self.synchronize_schema }

    pub fn identity_columns(&self) -> impl Iterator<Item = (&String, &ColumnType)> { self.columns.iter().filter(|(_, ty)| ty.identity) }

    pub fn non_key_columns(&self) -> impl Iterator<Item = (&String, &ColumnType)> { self.columns.iter().filter(|(name, _)| !self.is_key(name)) }

    /// Display name, `schema.table` when a schema is set.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// A copy that never attempts DDL. Used for tables reached through read-only connections.
    pub fn without_synchronization(&self) -> Self { Self { synchronize_schema: false, ..self.clone() } }

    /// A copy with one more nullable column.
    pub fn with_column(&self, name: impl Into<String>, column_type: ColumnType) -> Result<Self, StorageError> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(StorageError::argument(format!("column {} already declared on {}", name, self.qualified_name())));
        }
        let mut columns = self.columns.clone();
        columns.insert(name, column_type);
        let descriptor = Self { columns, ..self.clone() };
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<(), StorageError> {
        let table = self.qualified_name();
        if !sane_name(&self.name) || self.schema.as_deref().is_some_and(|s| !sane_name(s)) {
            return Err(StorageError::argument(format!("invalid table name {}", table)));
        }
        if self.columns.is_empty() {
            return Err(StorageError::argument(format!("table {} declares no columns", table)));
        }
        if let Some(bad) = self.columns.keys().find(|c| !sane_name(c)) {
            return Err(StorageError::argument(format!("invalid column name {} on {}", bad, table)));
        }
        if let Some(missing) = self.key_columns.iter().find(|k| !self.columns.contains_key(*k)) {
            return Err(StorageError::argument(format!("key column {} is not a column of {}", missing, table)));
        }
        let identities: Vec<_> = self.identity_columns().collect();
        if identities.len() > 1 {
            return Err(StorageError::argument(format!("table {} declares more than one identity column", table)));
        }
        if let Some((name, ty)) = identities.first() {
            if !(ty.base.is_integer() || ty.base == ValueType::Guid) {
                return Err(StorageError::argument(format!("identity column {} on {} must be an integer or guid", name, table)));
            }
        }
        Ok(())
    }
}

pub struct TableDescriptorBuilder {
    schema: Option<String>,
    name: String,
    key_columns: Vec<String>,
    columns: IndexMap<String, ColumnType>,
    synchronize_schema: bool,
}

impl TableDescriptorBuilder {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn key(mut self, name: impl Into<String>, column_type: impl Into<ColumnType>) -> Self {
        let name = name.into();
        if !self.key_columns.contains(&name) {
            self.key_columns.push(name.clone());
        }
        self.columns.insert(name, column_type.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>, column_type: impl Into<ColumnType>) -> Self {
        self.columns.insert(name.into(), column_type.into());
        self
    }

    pub fn keys<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        for (name, column_type) in columns {
            self = self.key(name, column_type);
        }
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        for (name, column_type) in columns {
            self = self.column(name, column_type);
        }
        self
    }

    pub fn synchronize_schema(mut self, enabled: bool) -> Self {
        self.synchronize_schema = enabled;
        self
    }

    pub fn build(self) -> Result<TableDescriptor, StorageError> {
        let descriptor = TableDescriptor {
            schema: self.schema,
            name: self.name,
            key_columns: self.key_columns,
            columns: self.columns,
            synchronize_schema: self.synchronize_schema,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
