use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tessera_core::collections::StorageSet;
use tessera_core::{ColumnValues, Mapper, QueryOptions, QueryResult, StorageError};
use tessql::{Predicate, Selection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{match_filter, require_key, split_keys, SchemaAware, TableOptions};
use crate::builder::SelectOptions;
use crate::driver::Driver;
use crate::table::SqlTable;
use crate::types::TypeMap;

/// A set of values stored one row per member.
///
/// Membership is decided by the key columns. A key may be natural (supplied by the value) or a
/// database identity, which is generated on first insert and written back onto the value.
pub struct SqlSet<T, D: Driver> {
    table: SqlTable<D>,
    mapper: Arc<dyn Mapper<T>>,
}

impl<T, D: Driver> Clone for SqlSet<T, D> {
    fn clone(&self) -> Self { Self { table: self.table.clone(), mapper: self.mapper.clone() } }
}

/// How [`SqlSet::add`] writes one value.
enum AddPlan {
    /// Natural key, or an identity that is already assigned.
    Upsert { keys: ColumnValues, identity: ColumnValues, rest: ColumnValues },
    /// Identity not yet assigned: insert and read it back.
    InsertReturning { values: ColumnValues, identity_column: String },
}

impl<T, D> SqlSet<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    /// `key_columns` names the mapper columns that identify a member. Empty means every column.
    pub fn new(driver: Arc<D>, options: &TableOptions, mapper: Arc<dyn Mapper<T>>, key_columns: &[&str], types: Arc<TypeMap>) -> Result<Self, StorageError> {
        let columns = mapper.columns();
        let keys = match key_columns {
            [] => columns.clone(),
            names => {
                let mut keys = Vec::with_capacity(names.len());
                for name in names {
                    let column = columns.iter().find(|(c, _)| c == name).ok_or_else(|| StorageError::argument(format!("{} is not a column of the set", name)))?;
                    keys.push(column.clone());
                }
                keys
            }
        };
        let descriptor = options.descriptor(keys, columns)?;
        Ok(Self { table: SqlTable::new(driver, descriptor, types), mapper })
    }

    pub fn table(&self) -> &SqlTable<D> { &self.table }

    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { table: self.table.cancellable(token), mapper: self.mapper.clone() } }

    fn identity_key(&self) -> Option<String> {
        let descriptor = self.table.descriptor();
        descriptor.identity_columns().find(|(name, _)| descriptor.is_key(name)).map(|(name, _)| name.clone())
    }

    fn plan(&self, value: &T) -> Result<AddPlan, StorageError> {
        let values = self.mapper.to_values(value)?;
        let descriptor = self.table.descriptor();
        match self.identity_key() {
            Some(identity_column) => {
                let assigned = values.get(&identity_column).cloned().flatten().filter(|v| !v.is_default());
                let (mut keys, rest) = split_keys(descriptor, values);
                keys.shift_remove(&identity_column);
                match assigned {
                    Some(id) => Ok(AddPlan::Upsert { keys, identity: ColumnValues::from([(identity_column, Some(id))]), rest }),
                    None => {
                        let mut values = keys;
                        values.extend(rest);
                        Ok(AddPlan::InsertReturning { values, identity_column })
                    }
                }
            }
            None => {
                let (keys, rest) = split_keys(descriptor, values);
                require_key(&self.table.label(), &keys)?;
                Ok(AddPlan::Upsert { keys, identity: ColumnValues::new(), rest })
            }
        }
    }

    fn key_filter(&self, value: &T) -> Result<Predicate, StorageError> {
        let (keys, _) = split_keys(self.table.descriptor(), self.mapper.to_values(value)?);
        require_key(&self.table.label(), &keys)?;
        Ok(match_filter(&keys))
    }
}

#[async_trait]
impl<T, D> StorageSet<T> for SqlSet<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    async fn add(&self, value: &mut T) -> Result<(), StorageError> {
        let builder = self.table.builder();
        match self.plan(value)? {
            AddPlan::Upsert { keys, identity, rest } => {
                let affected = self.table.execute(builder.merge(&keys, &rest, &identity)?).await?;
                if affected == 0 {
                    return Err(StorageError::failed(format!("{}: upsert affected no rows", self.table.label())));
                }
            }
            AddPlan::InsertReturning { values, identity_column } => {
                let command = builder.insert_returning(&values, &[identity_column.clone()])?;
                let mut row = self.table.query_first(command).await?.ok_or_else(|| StorageError::failed(format!("{}: insert returned no identity", self.table.label())))?;
                let generated = row.shift_remove(&identity_column).flatten();
                debug!("SqlSet({}).add: generated {} = {:?}", self.table.label(), identity_column, generated);
                self.mapper.assign(value, &identity_column, generated)?;
            }
        }
        Ok(())
    }

    async fn try_add(&self, value: &T) -> Result<bool, StorageError> {
        let builder = self.table.builder();
        let command = match self.plan(value)? {
            AddPlan::Upsert { keys, identity, rest } => {
                let mut matched = keys;
                matched.extend(identity);
                let filter = match_filter(&matched);
                matched.extend(rest);
                builder.insert_if_absent(&matched, &filter)?
            }
            // a fresh identity can never collide
            AddPlan::InsertReturning { values, .. } => builder.insert(&values)?,
        };
        Ok(self.table.execute(command).await? > 0)
    }

    async fn contains(&self, value: &T) -> Result<bool, StorageError> { self.table.exists(self.table.builder().exists(&self.key_filter(value)?)?).await }

    async fn try_remove(&self, value: &T) -> Result<bool, StorageError> {
        let command = self.table.builder().delete(&self.key_filter(value)?)?;
        Ok(self.table.execute(command).await? > 0)
    }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<T>, StorageError> {
        let columns: Vec<String> = self.table.descriptor().columns().keys().cloned().collect();
        let builder = self.table.builder();
        let select = builder.select(&columns, &selection.predicate, &SelectOptions { distinct: options.distinct, ..SelectOptions::from(selection) })?;
        let total = match options.with_total {
            true => Some(self.table.count(builder.count(&selection.predicate, options.distinct.then_some(columns.as_slice()))?).await?),
            false => None,
        };
        let mapper = self.mapper.clone();
        let items = self.table.stream(select).map(move |row| row.and_then(|mut row| Ok(mapper.from_values(&mut row)?)));
        Ok(QueryResult::new(Box::pin(items), total))
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { self.table.count(self.table.builder().count(predicate, None)?).await }
}

#[async_trait]
impl<T, D> SchemaAware for SqlSet<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    async fn ensure_schema(&self) -> Result<(), StorageError> { self.table.ensure_schema().await }
}
