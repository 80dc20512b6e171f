use std::sync::Arc;

use tessera_core::{Mapper, StorageError};

use crate::driver::{Driver, DriverOptions};
use crate::engine::{SqlList, SqlMap, SqlSet, SqlSetMap, SqlSortedSet, TableOptions};
use crate::expiration::ExpiringSqlMap;
use crate::types::TypeMap;

/// Builds collections over one driver and one shared [`TypeMap`].
pub struct SqlStorage<D: Driver> {
    driver: Arc<D>,
    types: Arc<TypeMap>,
}

impl<D: Driver> Clone for SqlStorage<D> {
    fn clone(&self) -> Self { Self { driver: self.driver.clone(), types: self.types.clone() } }
}

impl<D: Driver> SqlStorage<D> {
    pub fn new(driver: Arc<D>) -> Self { Self { driver, types: Arc::new(TypeMap::standard()) } }

    pub async fn open(connection_string: &str) -> Result<Self, StorageError> { Ok(Self::new(Arc::new(D::open(connection_string).await?))) }

    pub async fn open_with(connection_string: &str, options: DriverOptions) -> Result<Self, StorageError> {
        Ok(Self::new(Arc::new(D::open_with(connection_string, options).await?)))
    }

    /// Replace the coercion registry for every collection built afterwards.
    pub fn with_types(mut self, types: TypeMap) -> Self {
        self.types = Arc::new(types);
        self
    }

    pub fn driver(&self) -> &Arc<D> { &self.driver }

    pub fn types(&self) -> &Arc<TypeMap> { &self.types }

    pub fn map<K, V>(&self, options: &TableOptions, keys: Arc<dyn Mapper<K>>, values: Arc<dyn Mapper<V>>) -> Result<SqlMap<K, V, D>, StorageError>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        SqlMap::new(self.driver.clone(), options, keys, values, self.types.clone())
    }

    pub fn expiring_map<K, V>(&self, options: &TableOptions, keys: Arc<dyn Mapper<K>>, values: Arc<dyn Mapper<V>>) -> Result<ExpiringSqlMap<K, V, D>, StorageError>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        ExpiringSqlMap::new(self.driver.clone(), options, keys, values, self.types.clone())
    }

    pub fn set<T>(&self, options: &TableOptions, mapper: Arc<dyn Mapper<T>>, key_columns: &[&str]) -> Result<SqlSet<T, D>, StorageError>
    where T: Send + Sync + 'static {
        SqlSet::new(self.driver.clone(), options, mapper, key_columns, self.types.clone())
    }

    pub fn list<T>(&self, options: &TableOptions, mapper: Arc<dyn Mapper<T>>) -> Result<SqlList<T, D>, StorageError>
    where T: Send + Sync + 'static {
        SqlList::new(self.driver.clone(), options, mapper, self.types.clone())
    }

    pub fn set_map<K, V>(&self, options: &TableOptions, keys: Arc<dyn Mapper<K>>, items: Arc<dyn Mapper<V>>) -> Result<SqlSetMap<K, V, D>, StorageError>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        SqlSetMap::new(self.driver.clone(), options, keys, items, self.types.clone())
    }

    pub fn sorted_set<T>(&self, options: &TableOptions, mapper: Arc<dyn Mapper<T>>) -> Result<SqlSortedSet<T, D>, StorageError>
    where T: Send + Sync + 'static {
        SqlSortedSet::new(self.driver.clone(), options, mapper, self.types.clone())
    }
}
