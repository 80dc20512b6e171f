//! Per-key expiration on top of [`SqlMap`].
//!
//! Expired rows stay in the table until [`ExpiringMap::purge_expired`] runs, but every read hides
//! them: an augmenter appends `expiration IS NULL OR expiration > now` to the filter of each
//! select-family statement the map builds.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_core::collections::{ExpiringMap, PropertyMap, StorageMap};
use tessera_core::{ColumnType, ColumnValues, Mapper, QueryOptions, QueryResult, StorageError, Value, ValueType};
use tessql::{field, Predicate, Selection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{CommandAugmenter, Draft};
use crate::dialect::Dialect;
use crate::driver::Driver;
use crate::engine::{SchemaAware, SqlMap, TableOptions};
use crate::types::TypeMap;

pub const DEFAULT_EXPIRATION_COLUMN: &str = "expiration";

/// Parameter carrying the statement's notion of "now".
pub const NOW_PARAMETER: &str = "__now";

/// Restricts select-family statements to rows that have not expired.
pub struct ExpirationAugmenter {
    column: String,
}

impl ExpirationAugmenter {
    pub fn new(column: impl Into<String>) -> Self { Self { column: column.into() } }
}

impl CommandAugmenter for ExpirationAugmenter {
    fn augment(&self, draft: &mut Draft, dialect: &dyn Dialect) {
        if !draft.kind.is_select_family() {
            return;
        }
        let Some(filter) = draft.fragments.get_mut("filter") else { return };
        let column = dialect.quote_identifier(&self.column);
        let now = dialect.value_expression(&dialect.parameter_name(NOW_PARAMETER), Some(&ColumnType::new(ValueType::Timestamp)));
        *filter = format!("({}) AND ({} IS NULL OR {} > {})", filter, column, column, now);
        draft.parameters.set(NOW_PARAMETER, Some(Value::Timestamp(Utc::now())));
    }
}

/// A [`SqlMap`] whose entries can carry an expiration time.
pub struct ExpiringSqlMap<K, V, D: Driver> {
    map: SqlMap<K, V, D>,
    column: String,
}

impl<K, V, D: Driver> Clone for ExpiringSqlMap<K, V, D> {
    fn clone(&self) -> Self { Self { map: self.map.clone(), column: self.column.clone() } }
}

impl<K, V, D> ExpiringSqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    pub fn new(driver: Arc<D>, options: &TableOptions, keys: Arc<dyn Mapper<K>>, values: Arc<dyn Mapper<V>>, types: Arc<TypeMap>) -> Result<Self, StorageError> {
        Self::with_expiration_column(driver, options, keys, values, DEFAULT_EXPIRATION_COLUMN, types)
    }

    pub fn with_expiration_column(
        driver: Arc<D>,
        options: &TableOptions,
        keys: Arc<dyn Mapper<K>>,
        values: Arc<dyn Mapper<V>>,
        column: &str,
        types: Arc<TypeMap>,
    ) -> Result<Self, StorageError> {
        let descriptor = options.descriptor(keys.columns(), values.columns())?.with_column(column, ColumnType::new(ValueType::Timestamp))?;
        let augmenter: Arc<dyn CommandAugmenter> = Arc::new(ExpirationAugmenter::new(column));
        let map = SqlMap::with_descriptor(driver, descriptor, keys, values, types, vec![augmenter]);
        Ok(Self { map, column: column.to_owned() })
    }

    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { map: self.map.cancellable(token), column: self.column.clone() } }

    pub fn expiration_column(&self) -> &str { &self.column }

    fn expired(&self, now: DateTime<Utc>) -> Predicate { field(self.column.as_str()).is_not_null().and(field(self.column.as_str()).le(now)) }

    fn live(&self, now: DateTime<Utc>) -> Predicate { field(self.column.as_str()).is_null().or(field(self.column.as_str()).gt(now)) }

    fn expiration_values(&self, at: Option<DateTime<Utc>>) -> ColumnValues { ColumnValues::from([(self.column.clone(), at.map(Value::Timestamp))]) }

    /// Updates only touch live rows. Returns whether one was changed.
    async fn update_live(&self, key: &K, at: Option<DateTime<Utc>>, extra: Predicate) -> Result<bool, StorageError> {
        let filter = self.map.key_filter(key)?.and(self.live(Utc::now())).and(extra);
        let table = self.map.table();
        Ok(table.execute(table.builder().update(&self.expiration_values(at), &filter)?).await? > 0)
    }
}

impl<K, V, D: Driver> Deref for ExpiringSqlMap<K, V, D> {
    type Target = SqlMap<K, V, D>;

    fn deref(&self) -> &Self::Target { &self.map }
}

#[async_trait]
impl<K, V, D> StorageMap<K, V> for ExpiringSqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    /// A write replaces any expiration. Without `overwrite`, an expired entry counts as absent.
    async fn try_add(&self, key: &K, value: &V, overwrite: bool) -> Result<bool, StorageError> {
        if !overwrite {
            let table = self.map.table();
            let filter = self.map.key_filter(key)?.and(self.expired(Utc::now()));
            let cleared = table.execute(table.builder().delete(&filter)?).await?;
            if cleared > 0 {
                debug!("ExpiringSqlMap({}).try_add: replaced an expired entry", table.label());
            }
        }
        self.map.write(key, value, overwrite, self.expiration_values(None)).await
    }

    async fn get(&self, key: &K) -> Result<Option<V>, StorageError> { self.map.get(key).await }

    async fn try_remove(&self, key: &K) -> Result<bool, StorageError> { self.map.try_remove(key).await }

    async fn try_update(&self, key: &K, new_value: &V, old_value: &V) -> Result<bool, StorageError> {
        self.map.update_if_unchanged(key, new_value, old_value, self.live(Utc::now())).await
    }

    async fn contains_key(&self, key: &K) -> Result<bool, StorageError> { self.map.contains_key(key).await }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<(K, V)>, StorageError> { self.map.query(selection, options).await }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { StorageMap::count(&self.map, predicate).await }
}

/// Property writes only reach live rows, like every other key-targeted update.
#[async_trait]
impl<K, V, D> PropertyMap<K, V> for ExpiringSqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn set_property_value(&self, key: &K, property: &str, value: Option<Value>) -> Result<(), StorageError> {
        self.map.set_property_where(key, property, value, self.live(Utc::now())).await
    }

    async fn get_property_value(&self, key: &K, property: &str) -> Result<Option<Value>, StorageError> { self.map.get_property_value(key, property).await }

    async fn merge(&self, key: &K, partial: &V) -> Result<(), StorageError> { self.map.merge(key, partial).await }
}

#[async_trait]
impl<K, V, D> ExpiringMap<K> for ExpiringSqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn set_relative_expiration(&self, key: &K, ttl: Duration) -> Result<bool, StorageError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::argument(format!("expiration out of range: {}", e)))?;
        let at = Utc::now().checked_add_signed(ttl).ok_or_else(|| StorageError::argument("expiration out of range"))?;
        self.set_absolute_expiration(key, at).await
    }

    async fn set_absolute_expiration(&self, key: &K, at: DateTime<Utc>) -> Result<bool, StorageError> { self.update_live(key, Some(at), Predicate::True).await }

    async fn remove_expiration(&self, key: &K) -> Result<bool, StorageError> {
        self.update_live(key, None, field(self.column.as_str()).is_not_null()).await
    }

    async fn get_expiration(&self, key: &K) -> Result<Option<DateTime<Utc>>, StorageError> {
        let table = self.map.table();
        let command = table.builder().select_first(&[self.column.clone()], &self.map.key_filter(key)?)?;
        match table.query_first(command).await? {
            Some(mut row) => Ok(tessera_core::mapping::take_column(&mut row, &self.column)?),
            None => Ok(None),
        }
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let table = self.map.table();
        let purged = table.execute(table.builder().delete(&self.expired(Utc::now()))?).await?;
        info!("ExpiringSqlMap({}).purge_expired: {} row(s)", table.label(), purged);
        Ok(purged)
    }
}

#[async_trait]
impl<K, V, D> SchemaAware for ExpiringSqlMap<K, V, D>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    D: Driver,
{
    async fn ensure_schema(&self) -> Result<(), StorageError> { self.map.ensure_schema().await }
}
