use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tessera_core::collections::{PropertyMap, StorageMap};
use tessera_core::{ColumnValues, Mapper, QueryOptions, QueryResult, StorageError, TableDescriptor, Value};
use tessql::{Predicate, Selection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{match_filter, require_key, SchemaAware, TableOptions};
use crate::builder::SelectOptions;
use crate::command::CommandAugmenter;
use crate::driver::Driver;
use crate::table::SqlTable;
use crate::translate::Aliases;
use crate::types::TypeMap;

/// A key-value map stored one row per key.
///
/// In predicates, `key` and `value` alias the key and value columns when each maps onto a single
/// column; otherwise columns are referenced by name.
pub struct SqlMap<K, V, D: Driver> {
    pub(crate) table: SqlTable<D>,
    keys: Arc<dyn Mapper<K>>,
    values: Arc<dyn Mapper<V>>,
}

impl<K, V, D: Driver> Clone for SqlMap<K, V, D> {
    fn clone(&self) -> Self { Self { table: self.table.clone(), keys: self.keys.clone(), values: self.values.clone() } }
}

impl<K, V, D> SqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    pub fn new(driver: Arc<D>, options: &TableOptions, keys: Arc<dyn Mapper<K>>, values: Arc<dyn Mapper<V>>, types: Arc<TypeMap>) -> Result<Self, StorageError> {
        let descriptor = options.descriptor(keys.columns(), values.columns())?;
        Ok(Self::with_descriptor(driver, descriptor, keys, values, types, Vec::new()))
    }

    /// Build over an explicit descriptor, with augmenters applied to every statement.
    pub(crate) fn with_descriptor(
        driver: Arc<D>,
        descriptor: TableDescriptor,
        keys: Arc<dyn Mapper<K>>,
        values: Arc<dyn Mapper<V>>,
        types: Arc<TypeMap>,
        augmenters: Vec<Arc<dyn CommandAugmenter>>,
    ) -> Self {
        let mut aliases = Aliases::new();
        if let [(column, _)] = keys.columns().as_slice() {
            aliases.insert("key".into(), column.clone());
        }
        if let [(column, _)] = values.columns().as_slice() {
            aliases.insert("value".into(), column.clone());
        }
        let table = augmenters.into_iter().fold(SqlTable::new(driver, descriptor, types).with_aliases(aliases), SqlTable::with_augmenter);
        Self { table, keys, values }
    }

    pub fn table(&self) -> &SqlTable<D> { &self.table }

    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { table: self.table.cancellable(token), ..self.clone() } }

    pub(crate) fn key_values(&self, key: &K) -> Result<ColumnValues, StorageError> {
        let values = self.keys.to_values(key)?;
        require_key(&self.table.label(), &values)?;
        Ok(values)
    }

    pub(crate) fn key_filter(&self, key: &K) -> Result<Predicate, StorageError> { Ok(match_filter(&self.key_values(key)?)) }

    /// Value columns only; a value mapper may repeat key columns.
    fn value_values(&self, value: &V) -> Result<ColumnValues, StorageError> {
        let descriptor = self.table.descriptor();
        Ok(self.values.to_values(value)?.into_iter().filter(|(column, _)| !descriptor.is_key(column)).collect())
    }

    fn value_columns(&self) -> Vec<String> { self.values.columns().into_iter().map(|(name, _)| name).collect() }

    fn all_columns(&self) -> Vec<String> { self.table.descriptor().columns().keys().cloned().collect() }

    fn property_column(&self, property: &str) -> Result<String, StorageError> {
        let descriptor = self.table.descriptor();
        let found = descriptor.columns().keys().find(|c| c.as_str() == property).or_else(|| descriptor.columns().keys().find(|c| c.eq_ignore_ascii_case(property)));
        match found {
            Some(column) if descriptor.is_key(column) => Err(StorageError::argument(format!("{} is a key column and cannot be set as a property", column))),
            Some(column) => Ok(column.clone()),
            None => Err(StorageError::argument(format!("{} has no property {}", self.table.label(), property))),
        }
    }

    /// Compare-and-swap of the value columns, restricted further by `extra`.
    pub(crate) async fn update_if_unchanged(&self, key: &K, new_value: &V, old_value: &V, extra: Predicate) -> Result<bool, StorageError> {
        let filter = self.key_filter(key)?.and(extra);
        let command = self.table.builder().update_if_unchanged(&self.value_values(new_value)?, &filter, &self.value_values(old_value)?)?;
        let affected = self.table.execute(command).await?;
        debug!("SqlMap({}).try_update: {} row(s)", self.table.label(), affected);
        Ok(affected == 1)
    }

    pub(crate) async fn set_property_where(&self, key: &K, property: &str, value: Option<Value>, extra: Predicate) -> Result<(), StorageError> {
        let column = self.property_column(property)?;
        let filter = self.key_filter(key)?.and(extra);
        let assignments = ColumnValues::from([(column.clone(), value)]);
        let affected = self.table.execute(self.table.builder().update(&assignments, &filter)?).await?;
        if affected == 0 {
            return Err(StorageError::failed(format!("{}: no row to set {} on", self.table.label(), column)));
        }
        Ok(())
    }

    /// Insert or upsert one entry, with `extra` columns written alongside the value.
    pub(crate) async fn write(&self, key: &K, value: &V, overwrite: bool, extra: ColumnValues) -> Result<bool, StorageError> {
        let key_values = self.key_values(key)?;
        let mut values = self.value_values(value)?;
        values.extend(extra);
        let builder = self.table.builder();
        let command = if overwrite {
            builder.merge(&key_values, &values, &ColumnValues::new())?
        } else {
            let mut row = key_values.clone();
            row.extend(values);
            builder.insert_if_absent(&row, &match_filter(&key_values))?
        };
        debug!("SqlMap({}).try_add: overwrite={}", self.table.label(), overwrite);
        Ok(self.table.execute(command).await? > 0)
    }

    fn row_to_pair(keys: &Arc<dyn Mapper<K>>, values: &Arc<dyn Mapper<V>>, mut row: ColumnValues) -> Result<(K, V), StorageError> {
        let key = keys.from_values(&mut row.clone())?;
        let value = values.from_values(&mut row)?;
        Ok((key, value))
    }
}

#[async_trait]
impl<K, V, D> StorageMap<K, V> for SqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn try_add(&self, key: &K, value: &V, overwrite: bool) -> Result<bool, StorageError> { self.write(key, value, overwrite, ColumnValues::new()).await }

    async fn get(&self, key: &K) -> Result<Option<V>, StorageError> {
        let command = self.table.builder().select_first(&self.value_columns(), &self.key_filter(key)?)?;
        match self.table.query_first(command).await? {
            Some(mut row) => Ok(Some(self.values.from_values(&mut row)?)),
            None => Ok(None),
        }
    }

    async fn try_remove(&self, key: &K) -> Result<bool, StorageError> {
        let command = self.table.builder().delete(&self.key_filter(key)?)?;
        Ok(self.table.execute(command).await? > 0)
    }

    async fn try_update(&self, key: &K, new_value: &V, old_value: &V) -> Result<bool, StorageError> { self.update_if_unchanged(key, new_value, old_value, Predicate::True).await }

    async fn contains_key(&self, key: &K) -> Result<bool, StorageError> { self.table.exists(self.table.builder().exists(&self.key_filter(key)?)?).await }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<(K, V)>, StorageError> {
        let columns = self.all_columns();
        let builder = self.table.builder();
        let select = builder.select(&columns, &selection.predicate, &SelectOptions { distinct: options.distinct, ..SelectOptions::from(selection) })?;
        let total = match options.with_total {
            true => Some(self.table.count(builder.count(&selection.predicate, options.distinct.then_some(columns.as_slice()))?).await?),
            false => None,
        };
        let (keys, values) = (self.keys.clone(), self.values.clone());
        let items = self.table.stream(select).map(move |row| row.and_then(|row| Self::row_to_pair(&keys, &values, row)));
        Ok(QueryResult::new(Box::pin(items), total))
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { self.table.count(self.table.builder().count(predicate, None)?).await }
}

#[async_trait]
impl<K, V, D> PropertyMap<K, V> for SqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn set_property_value(&self, key: &K, property: &str, value: Option<Value>) -> Result<(), StorageError> { self.set_property_where(key, property, value, Predicate::True).await }

    async fn get_property_value(&self, key: &K, property: &str) -> Result<Option<Value>, StorageError> {
        let column = self.property_column(property)?;
        let command = self.table.builder().select_first(&[column.clone()], &self.key_filter(key)?)?;
        Ok(self.table.query_first(command).await?.and_then(|mut row| row.shift_remove(&column)).flatten())
    }

    async fn merge(&self, key: &K, partial: &V) -> Result<(), StorageError> {
        let key_values = self.key_values(key)?;
        let values: ColumnValues = self.value_values(partial)?.into_iter().filter(|(_, value)| value.as_ref().is_some_and(|v| !v.is_default())).collect();
        let affected = self.table.execute(self.table.builder().merge(&key_values, &values, &ColumnValues::new())?).await?;
        if affected == 0 {
            return Err(StorageError::failed(format!("{}: merge affected no rows", self.table.label())));
        }
        Ok(())
    }
}

#[async_trait]
impl<K, V, D> SchemaAware for SqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn ensure_schema(&self) -> Result<(), StorageError> { self.table.ensure_schema().await }
}
