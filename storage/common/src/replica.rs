//! Read/write splitting over a pair of engines.
//!
//! Writes go to the primary. Reads converge the schema through the primary first, then run
//! against a connection opened with the driver's read-only marker. The read side never
//! synchronizes schema itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_core::collections::{ExpiringMap, ScoreRange, StorageList, StorageMap, StorageSet, StorageSortedSet};
use tessera_core::{QueryOptions, QueryResult, StorageError};
use tessql::{Predicate, Selection};
use tracing::info;

use crate::driver::{Driver, DriverOptions};
use crate::engine::{SchemaAware, TableOptions};

pub struct ReadReplica<E> {
    write: E,
    read: E,
}

impl<E: Clone> Clone for ReadReplica<E> {
    fn clone(&self) -> Self { Self { write: self.write.clone(), read: self.read.clone() } }
}

impl<E> ReadReplica<E>
where E: SchemaAware
{
    /// Pair two engines built over the same table. `read` must not synchronize schema.
    pub fn new(write: E, read: E) -> Self { Self { write, read } }

    /// Open a primary and a read-only driver from one connection string, and build the same
    /// engine over each.
    pub async fn open<D, F>(connection_string: &str, driver_options: DriverOptions, options: &TableOptions, build: F) -> Result<Self, StorageError>
    where
        D: Driver,
        F: Fn(Arc<D>, &TableOptions) -> Result<E, StorageError>,
    {
        if D::has_read_only_marker(connection_string) {
            return Err(StorageError::argument(format!("connection string already carries the read-only marker {}", D::READ_ONLY_MARKER)));
        }
        let primary = D::open_with(connection_string, driver_options.clone()).await?;
        let replica = D::open_with(&D::read_only_connection_string(connection_string), driver_options).await?;
        info!("ReadReplica({}): routing reads to a read-only connection", options.name);
        Self::from_drivers(Arc::new(primary), Arc::new(replica), options, build)
    }

    pub fn from_drivers<D, F>(primary: Arc<D>, replica: Arc<D>, options: &TableOptions, build: F) -> Result<Self, StorageError>
    where
        D: Driver,
        F: Fn(Arc<D>, &TableOptions) -> Result<E, StorageError>,
    {
        let write = build(primary, options)?;
        let read = build(replica, &options.clone().without_synchronization())?;
        Ok(Self { write, read })
    }

    pub fn writer(&self) -> &E { &self.write }

    pub fn reader(&self) -> &E { &self.read }

    async fn reader_ready(&self) -> Result<&E, StorageError> {
        self.write.ensure_schema().await?;
        Ok(&self.read)
    }
}

#[async_trait]
impl<E> SchemaAware for ReadReplica<E>
where E: SchemaAware
{
    async fn ensure_schema(&self) -> Result<(), StorageError> { self.write.ensure_schema().await }
}

#[async_trait]
impl<K, V, E> StorageMap<K, V> for ReadReplica<E>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: StorageMap<K, V> + SchemaAware,
{
    async fn try_add(&self, key: &K, value: &V, overwrite: bool) -> Result<bool, StorageError> { self.write.try_add(key, value, overwrite).await }

    async fn get(&self, key: &K) -> Result<Option<V>, StorageError> { self.reader_ready().await?.get(key).await }

    async fn try_remove(&self, key: &K) -> Result<bool, StorageError> { self.write.try_remove(key).await }

    async fn try_update(&self, key: &K, new_value: &V, old_value: &V) -> Result<bool, StorageError> { self.write.try_update(key, new_value, old_value).await }

    async fn contains_key(&self, key: &K) -> Result<bool, StorageError> { self.reader_ready().await?.contains_key(key).await }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<(K, V)>, StorageError> {
        self.reader_ready().await?.query(selection, options).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { self.reader_ready().await?.count(predicate).await }
}

#[async_trait]
impl<K, E> ExpiringMap<K> for ReadReplica<E>
where
    K: Send + Sync + 'static,
    E: ExpiringMap<K> + SchemaAware,
{
    async fn set_relative_expiration(&self, key: &K, ttl: Duration) -> Result<bool, StorageError> { self.write.set_relative_expiration(key, ttl).await }

    async fn set_absolute_expiration(&self, key: &K, at: DateTime<Utc>) -> Result<bool, StorageError> { self.write.set_absolute_expiration(key, at).await }

    async fn remove_expiration(&self, key: &K) -> Result<bool, StorageError> { self.write.remove_expiration(key).await }

    async fn get_expiration(&self, key: &K) -> Result<Option<DateTime<Utc>>, StorageError> { self.reader_ready().await?.get_expiration(key).await }

    async fn purge_expired(&self) -> Result<u64, StorageError> { self.write.purge_expired().await }
}

#[async_trait]
impl<T, E> StorageSet<T> for ReadReplica<E>
where
    T: Send + Sync + 'static,
    E: StorageSet<T> + SchemaAware,
{
    async fn add(&self, value: &mut T) -> Result<(), StorageError> { self.write.add(value).await }

    async fn try_add(&self, value: &T) -> Result<bool, StorageError> { self.write.try_add(value).await }

    async fn contains(&self, value: &T) -> Result<bool, StorageError> { self.reader_ready().await?.contains(value).await }

    async fn try_remove(&self, value: &T) -> Result<bool, StorageError> { self.write.try_remove(value).await }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<T>, StorageError> {
        self.reader_ready().await?.query(selection, options).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { self.reader_ready().await?.count(predicate).await }
}

#[async_trait]
impl<T, E> StorageList<T> for ReadReplica<E>
where
    T: Send + Sync + 'static,
    E: StorageList<T> + SchemaAware,
{
    async fn add(&self, value: &mut T) -> Result<(), StorageError> { self.write.add(value).await }

    async fn remove_all(&self, value: &T) -> Result<u64, StorageError> { self.write.remove_all(value).await }

    async fn range(&self, skip: u64, take: Option<u64>) -> Result<QueryResult<T>, StorageError> { self.reader_ready().await?.range(skip, take).await }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<T>, StorageError> {
        self.reader_ready().await?.query(selection, options).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { self.reader_ready().await?.count(predicate).await }
}

#[async_trait]
impl<T, E> StorageSortedSet<T> for ReadReplica<E>
where
    T: Send + Sync + 'static,
    E: StorageSortedSet<T> + SchemaAware,
{
    async fn add(&self, member: &T, score: f64) -> Result<(), StorageError> { self.write.add(member, score).await }

    async fn increment(&self, member: &T, delta: f64) -> Result<f64, StorageError> { self.write.increment(member, delta).await }

    async fn score(&self, member: &T) -> Result<Option<f64>, StorageError> { self.reader_ready().await?.score(member).await }

    async fn remove(&self, member: &T) -> Result<bool, StorageError> { self.write.remove(member).await }

    async fn len(&self) -> Result<u64, StorageError> { self.reader_ready().await?.len().await }

    async fn range_by_score(&self, range: ScoreRange) -> Result<QueryResult<(T, f64)>, StorageError> { self.reader_ready().await?.range_by_score(range).await }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::stream;

    use super::*;

    /// Records which side served each call.
    #[derive(Clone)]
    struct Side {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Side {
        fn record(&self, op: &str) { self.log.lock().unwrap().push(format!("{}.{}", self.name, op)); }
    }

    #[async_trait]
    impl SchemaAware for Side {
        async fn ensure_schema(&self) -> Result<(), StorageError> {
            self.record("ensure_schema");
            Ok(())
        }
    }

    #[async_trait]
    impl StorageMap<String, String> for Side {
        async fn try_add(&self, _key: &String, _value: &String, _overwrite: bool) -> Result<bool, StorageError> {
            self.record("try_add");
            Ok(true)
        }

        async fn get(&self, _key: &String) -> Result<Option<String>, StorageError> {
            self.record("get");
            Ok(None)
        }

        async fn try_remove(&self, _key: &String) -> Result<bool, StorageError> {
            self.record("try_remove");
            Ok(false)
        }

        async fn try_update(&self, _key: &String, _new: &String, _old: &String) -> Result<bool, StorageError> {
            self.record("try_update");
            Ok(false)
        }

        async fn contains_key(&self, _key: &String) -> Result<bool, StorageError> {
            self.record("contains_key");
            Ok(false)
        }

        async fn query(&self, _selection: &Selection, _options: QueryOptions) -> Result<QueryResult<(String, String)>, StorageError> {
            self.record("query");
            Ok(QueryResult::new(Box::pin(stream::empty()), None))
        }

        async fn count(&self, _predicate: &Predicate) -> Result<u64, StorageError> {
            self.record("count");
            Ok(0)
        }
    }

    fn replica() -> (ReadReplica<Side>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let replica = ReadReplica::new(Side { name: "write", log: log.clone() }, Side { name: "read", log: log.clone() });
        (replica, log)
    }

    #[tokio::test]
    async fn test_reads_converge_schema_on_primary_first() -> anyhow::Result<()> {
        let (replica, log) = replica();
        let key = "k".to_string();
        StorageMap::get(&replica, &key).await?;
        StorageMap::count(&replica, &Predicate::True).await?;
        assert_eq!(*log.lock().unwrap(), vec!["write.ensure_schema", "read.get", "write.ensure_schema", "read.count"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_writes_stay_on_primary() -> anyhow::Result<()> {
        let (replica, log) = replica();
        let key = "k".to_string();
        StorageMap::try_add(&replica, &key, &key, false).await?;
        StorageMap::try_update(&replica, &key, &key, &key).await?;
        StorageMap::try_remove(&replica, &key).await?;
        assert_eq!(*log.lock().unwrap(), vec!["write.try_add", "write.try_update", "write.try_remove"]);
        Ok(())
    }
}
