//! SQL implementations of the collection contracts.

mod list;
mod map;
mod set;
mod set_map;
mod sorted_set;

pub use list::SqlList;
pub use map::SqlMap;
pub use set::SqlSet;
pub use set_map::{SqlKeyedSet, SqlSetMap};
pub use sorted_set::SqlSortedSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use tessera_core::{ColumnType, ColumnValues, StorageError, TableDescriptor};
use tessql::{Expr, Predicate};

/// Where an engine keeps its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    pub name: String,
    pub schema: Option<String>,
    pub synchronize_schema: bool,
}

impl TableOptions {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), schema: None, synchronize_schema: true } }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn without_synchronization(mut self) -> Self {
        self.synchronize_schema = false;
        self
    }

    /// Declare a table from key columns and value columns. A column in both lists is a key column.
    pub fn descriptor(&self, keys: Vec<(String, ColumnType)>, columns: Vec<(String, ColumnType)>) -> Result<TableDescriptor, StorageError> {
        let mut builder = TableDescriptor::builder(&self.name).keys(keys.clone()).synchronize_schema(self.synchronize_schema);
        if let Some(schema) = &self.schema {
            builder = builder.schema(schema);
        }
        let columns = columns.into_iter().filter(|(name, _)| !keys.iter().any(|(k, _)| k == name));
        builder.columns(columns).build()
    }
}

/// Access to the table-level schema step, so read paths can converge the schema through another engine.
#[async_trait]
pub trait SchemaAware: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), StorageError>;
}

/// `col1 = v1 AND col2 = v2 ...`, with nulls compared through `IS NULL`.
pub fn match_filter(values: &ColumnValues) -> Predicate {
    values.iter().fold(Predicate::True, |filter, (column, value)| {
        filter.and(Predicate::Comparison {
            left: Box::new(Expr::Field(column.clone())),
            operator: tessql::ComparisonOperator::Equal,
            right: Box::new(Expr::from(value.clone())),
        })
    })
}

/// Reject key values with a null component. Keys are matched with `=`, so a null would never match.
pub fn require_key(label: &str, values: &ColumnValues) -> Result<(), StorageError> {
    match values.iter().find(|(_, value)| value.is_none()) {
        Some((column, _)) => Err(StorageError::argument(format!("{}: key column {} is null", label, column))),
        None => Ok(()),
    }
}

/// Split one row of values into (key columns, everything else).
pub fn split_keys(descriptor: &TableDescriptor, values: ColumnValues) -> (ColumnValues, ColumnValues) {
    let mut keys = IndexMap::new();
    let mut rest = IndexMap::new();
    for (column, value) in values {
        if descriptor.is_key(&column) {
            keys.insert(column, value);
        } else {
            rest.insert(column, value);
        }
    }
    (keys, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Value, ValueType};
    use tessql::field;

    #[test]
    fn test_match_filter() {
        let mut values = ColumnValues::new();
        values.insert("a".into(), Some(Value::I32(1)));
        values.insert("b".into(), None);
        assert_eq!(match_filter(&values), field("a").eq(1).and(field("b").is_null()));
        assert_eq!(match_filter(&ColumnValues::new()), Predicate::True);
    }

    #[test]
    fn test_descriptor_dedupes_key_columns() {
        let options = TableOptions::new("people").schema("app");
        let descriptor = options
            .descriptor(vec![("Id".into(), ValueType::I32.into())], vec![("Id".into(), ValueType::I32.into()), ("Name".into(), ValueType::String.into())])
            .unwrap();
        assert_eq!(descriptor.columns().len(), 2);
        assert_eq!(descriptor.schema(), Some("app"));
        assert!(descriptor.is_key("Id"));
    }
}
