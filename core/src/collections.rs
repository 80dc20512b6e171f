//! Collection contracts implemented by every backend.
//!
//! `try_*` operations return `false` for the expected "not applied" outcome (key already present,
//! row concurrently changed, ...). Errors are reserved for failures.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessql::{Predicate, Selection};

use crate::error::StorageError;
use crate::query::{QueryOptions, QueryResult};
use crate::Value;

#[async_trait]
pub trait StorageMap<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Insert `value` under `key`. With `overwrite` an existing value is replaced, otherwise the
    /// call returns false when the key is present.
    async fn try_add(&self, key: &K, value: &V, overwrite: bool) -> Result<bool, StorageError>;

    async fn get(&self, key: &K) -> Result<Option<V>, StorageError>;

    async fn try_remove(&self, key: &K) -> Result<bool, StorageError>;

    /// Compare-and-swap: replace the value only if it still equals `old_value`.
    async fn try_update(&self, key: &K, new_value: &V, old_value: &V) -> Result<bool, StorageError>;

    async fn contains_key(&self, key: &K) -> Result<bool, StorageError>;

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<(K, V)>, StorageError>;

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError>;
}

/// Column-level access to map values.
#[async_trait]
pub trait PropertyMap<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn set_property_value(&self, key: &K, property: &str, value: Option<Value>) -> Result<(), StorageError>;

    async fn get_property_value(&self, key: &K, property: &str) -> Result<Option<Value>, StorageError>;

    /// Upsert only the columns of `partial` that hold a non-default value.
    async fn merge(&self, key: &K, partial: &V) -> Result<(), StorageError>;
}

#[async_trait]
pub trait StorageSet<T>: Send + Sync
where T: Send + Sync + 'static
{
    /// Insert or replace. Identities generated by the database are written back onto `value`.
    async fn add(&self, value: &mut T) -> Result<(), StorageError>;

    /// Insert only if no row has the same key.
    async fn try_add(&self, value: &T) -> Result<bool, StorageError>;

    async fn contains(&self, value: &T) -> Result<bool, StorageError>;

    async fn try_remove(&self, value: &T) -> Result<bool, StorageError>;

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<T>, StorageError>;

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait StorageList<T>: Send + Sync
where T: Send + Sync + 'static
{
    /// Append. The generated identity is written back onto `value`.
    async fn add(&self, value: &mut T) -> Result<(), StorageError>;

    /// Remove every element equal to `value` by its natural key. Returns how many were removed.
    async fn remove_all(&self, value: &T) -> Result<u64, StorageError>;

    /// Elements in insertion order.
    async fn range(&self, skip: u64, take: Option<u64>) -> Result<QueryResult<T>, StorageError>;

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<T>, StorageError>;

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError>;
}

/// The items stored under one key of a [`StorageSetMap`].
#[async_trait]
pub trait KeyedSet<V>: Send + Sync
where V: Send + Sync + 'static
{
    async fn add(&self, item: &V) -> Result<(), StorageError>;

    async fn try_add(&self, item: &V) -> Result<bool, StorageError>;

    async fn try_remove(&self, item: &V) -> Result<bool, StorageError>;

    async fn contains(&self, item: &V) -> Result<bool, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;

    async fn items(&self) -> Result<QueryResult<V>, StorageError>;

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<V>, StorageError>;
}

#[async_trait]
pub trait StorageSetMap<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Set: KeyedSet<V>;

    /// Store `items` under `key` atomically. With `overwrite` the previous items are replaced.
    /// Returns false, leaving the stored set untouched, if any item could not be inserted.
    async fn try_add(&self, key: &K, items: &[V], overwrite: bool) -> Result<bool, StorageError>;

    /// The set stored under `key`, or `None` when it holds no items.
    async fn get(&self, key: &K) -> Result<Option<Self::Set>, StorageError>;

    async fn get_or_empty(&self, key: &K) -> Result<Self::Set, StorageError>;

    async fn try_remove(&self, key: &K) -> Result<bool, StorageError>;

    async fn contains_key(&self, key: &K) -> Result<bool, StorageError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub descending: bool,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

#[async_trait]
pub trait StorageSortedSet<T>: Send + Sync
where T: Send + Sync + 'static
{
    async fn add(&self, member: &T, score: f64) -> Result<(), StorageError>;

    /// Add `delta` to the member's score, inserting it at `delta` when absent. Returns the new score.
    async fn increment(&self, member: &T, delta: f64) -> Result<f64, StorageError>;

    async fn score(&self, member: &T) -> Result<Option<f64>, StorageError>;

    async fn remove(&self, member: &T) -> Result<bool, StorageError>;

    async fn len(&self) -> Result<u64, StorageError>;

    async fn range_by_score(&self, range: ScoreRange) -> Result<QueryResult<(T, f64)>, StorageError>;
}

#[async_trait]
pub trait ExpiringMap<K>: Send + Sync
where K: Send + Sync + 'static
{
    async fn set_relative_expiration(&self, key: &K, ttl: Duration) -> Result<bool, StorageError>;

    async fn set_absolute_expiration(&self, key: &K, at: DateTime<Utc>) -> Result<bool, StorageError>;

    /// Returns false when the key is absent or carried no expiration.
    async fn remove_expiration(&self, key: &K) -> Result<bool, StorageError>;

    async fn get_expiration(&self, key: &K) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Physically delete rows whose expiration has passed. Returns how many were deleted.
    async fn purge_expired(&self) -> Result<u64, StorageError>;
}
