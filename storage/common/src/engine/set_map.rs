use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tessera_core::collections::{KeyedSet, StorageSetMap};
use tessera_core::{ColumnValues, Mapper, QueryOptions, QueryResult, StorageError};
use tessql::{Predicate, Selection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{match_filter, require_key, TableOptions};
use crate::builder::SelectOptions;
use crate::dialect::IsolationLevel;
use crate::driver::{Driver, SqlConnection};
use crate::table::{SqlTable, Transaction};
use crate::types::TypeMap;

/// Sets of items stored under keys. Every item is a row whose key is (owner key, item columns).
pub struct SqlSetMap<K, V, D: Driver> {
    table: SqlTable<D>,
    keys: Arc<dyn Mapper<K>>,
    items: Arc<dyn Mapper<V>>,
    isolation: IsolationLevel,
}

impl<K, V, D: Driver> Clone for SqlSetMap<K, V, D> {
    fn clone(&self) -> Self { Self { table: self.table.clone(), keys: self.keys.clone(), items: self.items.clone(), isolation: self.isolation } }
}

impl<K, V, D> SqlSetMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    pub fn new(driver: Arc<D>, options: &TableOptions, keys: Arc<dyn Mapper<K>>, items: Arc<dyn Mapper<V>>, types: Arc<TypeMap>) -> Result<Self, StorageError> {
        let mut row_key = keys.columns();
        for column in items.columns() {
            if row_key.iter().any(|(name, _)| *name == column.0) {
                return Err(StorageError::argument(format!("item column {} collides with a key column", column.0)));
            }
            row_key.push(column);
        }
        let descriptor = options.descriptor(row_key, Vec::new())?;
        Ok(Self { table: SqlTable::new(driver, descriptor, types), keys, items, isolation: IsolationLevel::default() })
    }

    /// Isolation for the transaction that replaces a key's items.
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn table(&self) -> &SqlTable<D> { &self.table }

    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { table: self.table.cancellable(token), ..self.clone() } }

    fn owner_values(&self, key: &K) -> Result<ColumnValues, StorageError> {
        let values = self.keys.to_values(key)?;
        require_key(&self.table.label(), &values)?;
        Ok(values)
    }

    fn view(&self, owner: ColumnValues) -> SqlKeyedSet<V, D> {
        SqlKeyedSet { table: self.table.clone(), items: self.items.clone(), filter: match_filter(&owner), owner }
    }

    /// Inserts every item inside `tx`. Returns false at the first item that was not inserted.
    async fn fill(&self, tx: &mut Transaction<D::Connection>, owner: &ColumnValues, items: &[V], overwrite: bool) -> Result<bool, StorageError> {
        let builder = self.table.builder();
        if overwrite {
            let removed = tx.connection().execute(&builder.delete(&match_filter(owner))?).await?;
            debug!("SqlSetMap({}).try_add: cleared {} item(s)", self.table.label(), removed);
        }
        for item in items {
            let mut row = owner.clone();
            row.extend(self.items.to_values(item)?);
            let command = builder.insert_if_absent(&row, &match_filter(&row))?;
            if tx.connection().execute(&command).await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl<K, V, D> StorageSetMap<K, V> for SqlSetMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    type Set = SqlKeyedSet<V, D>;

    async fn try_add(&self, key: &K, items: &[V], overwrite: bool) -> Result<bool, StorageError> {
        let owner = self.owner_values(key)?;
        let builder = self.table.builder();
        let begin = builder.begin(self.isolation)?;
        self.table
            .scope()
            .run(async {
                let connection = self.table.connection().await?;
                let mut tx = Transaction::begin(connection, builder, begin).await?;
                match self.fill(&mut tx, &owner, items, overwrite).await {
                    Ok(true) => {
                        tx.commit().await?;
                        Ok(true)
                    }
                    Ok(false) => {
                        debug!("SqlSetMap({}).try_add: item already present, rolling back", self.table.label());
                        tx.rollback().await?;
                        Ok(false)
                    }
                    Err(err) => {
                        if let Err(rollback) = tx.rollback().await {
                            warn!("SqlSetMap({}).try_add: rollback failed: {}", self.table.label(), rollback);
                        }
                        Err(err)
                    }
                }
            })
            .await
    }

    async fn get(&self, key: &K) -> Result<Option<Self::Set>, StorageError> {
        let owner = self.owner_values(key)?;
        let exists = self.table.exists(self.table.builder().exists(&match_filter(&owner))?).await?;
        Ok(exists.then(|| self.view(owner)))
    }

    async fn get_or_empty(&self, key: &K) -> Result<Self::Set, StorageError> { Ok(self.view(self.owner_values(key)?)) }

    async fn try_remove(&self, key: &K) -> Result<bool, StorageError> {
        let command = self.table.builder().delete(&match_filter(&self.owner_values(key)?))?;
        Ok(self.table.execute(command).await? > 0)
    }

    async fn contains_key(&self, key: &K) -> Result<bool, StorageError> {
        self.table.exists(self.table.builder().exists(&match_filter(&self.owner_values(key)?))?).await
    }
}

/// The items under one key. Every statement it builds is scoped by the owner's key filter.
pub struct SqlKeyedSet<V, D: Driver> {
    table: SqlTable<D>,
    items: Arc<dyn Mapper<V>>,
    owner: ColumnValues,
    filter: Predicate,
}

impl<V, D> SqlKeyedSet<V, D>
where
    V: Send + Sync + 'static,
    D: Driver,
{
    fn row(&self, item: &V) -> Result<ColumnValues, StorageError> {
        let mut row = self.owner.clone();
        row.extend(self.items.to_values(item)?);
        Ok(row)
    }

    fn scoped(&self, predicate: Predicate) -> Predicate { self.filter.clone().and(predicate) }

    fn item_columns(&self) -> Vec<String> { self.items.columns().into_iter().map(|(name, _)| name).collect() }
}

#[async_trait]
impl<V, D> KeyedSet<V> for SqlKeyedSet<V, D>
where
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn add(&self, item: &V) -> Result<(), StorageError> {
        let command = self.table.builder().merge(&self.row(item)?, &ColumnValues::new(), &ColumnValues::new())?;
        self.table.execute(command).await?;
        Ok(())
    }

    async fn try_add(&self, item: &V) -> Result<bool, StorageError> {
        let row = self.row(item)?;
        let command = self.table.builder().insert_if_absent(&row, &match_filter(&row))?;
        Ok(self.table.execute(command).await? > 0)
    }

    async fn try_remove(&self, item: &V) -> Result<bool, StorageError> {
        let command = self.table.builder().delete(&match_filter(&self.row(item)?))?;
        Ok(self.table.execute(command).await? > 0)
    }

    async fn contains(&self, item: &V) -> Result<bool, StorageError> { self.table.exists(self.table.builder().exists(&match_filter(&self.row(item)?))?).await }

    async fn count(&self) -> Result<u64, StorageError> { self.table.count(self.table.builder().count(&self.filter, None)?).await }

    async fn items(&self) -> Result<QueryResult<V>, StorageError> { self.query(&Selection::all(), QueryOptions::default()).await }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<V>, StorageError> {
        let columns = self.item_columns();
        let predicate = self.scoped(selection.predicate.clone());
        let builder = self.table.builder();
        let select = builder.select(&columns, &predicate, &SelectOptions { distinct: options.distinct, ..SelectOptions::from(selection) })?;
        let total = match options.with_total {
            true => Some(self.table.count(builder.count(&predicate, options.distinct.then_some(columns.as_slice()))?).await?),
            false => None,
        };
        let items = self.items.clone();
        let rows = self.table.stream(select).map(move |row| row.and_then(|mut row| Ok(items.from_values(&mut row)?)));
        Ok(QueryResult::new(Box::pin(rows), total))
    }
}
