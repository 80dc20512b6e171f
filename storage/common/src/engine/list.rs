use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tessera_core::collections::StorageList;
use tessera_core::{ColumnValues, Mapper, QueryOptions, QueryResult, StorageError};
use tessql::{OrderByItem, OrderDirection, Predicate, Selection};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{match_filter, SchemaAware, TableOptions};
use crate::builder::SelectOptions;
use crate::command::Command;
use crate::driver::Driver;
use crate::table::SqlTable;
use crate::types::TypeMap;

/// An append-only list. Order is the order of a generated identity column.
pub struct SqlList<T, D: Driver> {
    table: SqlTable<D>,
    mapper: Arc<dyn Mapper<T>>,
    identity: String,
}

impl<T, D: Driver> Clone for SqlList<T, D> {
    fn clone(&self) -> Self { Self { table: self.table.clone(), mapper: self.mapper.clone(), identity: self.identity.clone() } }
}

impl<T, D> SqlList<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    /// The mapper must declare exactly one identity column, which becomes the row key.
    pub fn new(driver: Arc<D>, options: &TableOptions, mapper: Arc<dyn Mapper<T>>, types: Arc<TypeMap>) -> Result<Self, StorageError> {
        let columns = mapper.columns();
        let identity = columns
            .iter()
            .find(|(_, ty)| ty.identity)
            .cloned()
            .ok_or_else(|| StorageError::argument(format!("list {} requires an identity column", options.name)))?;
        let descriptor = options.descriptor(vec![identity.clone()], columns)?;
        Ok(Self { table: SqlTable::new(driver, descriptor, types), mapper, identity: identity.0 })
    }

    pub fn table(&self) -> &SqlTable<D> { &self.table }

    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { table: self.table.cancellable(token), ..self.clone() } }

    fn columns(&self) -> Vec<String> { self.table.descriptor().columns().keys().cloned().collect() }

    /// Everything but the identity: the value's natural key.
    fn natural_values(&self, value: &T) -> Result<ColumnValues, StorageError> {
        let mut values = self.mapper.to_values(value)?;
        values.shift_remove(&self.identity);
        Ok(values)
    }

    fn stream(&self, select: Command) -> QueryResult<T> {
        let mapper = self.mapper.clone();
        QueryResult::new(Box::pin(self.table.stream(select).map(move |row| row.and_then(|mut row| Ok(mapper.from_values(&mut row)?)))), None)
    }
}

#[async_trait]
impl<T, D> StorageList<T> for SqlList<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    async fn add(&self, value: &mut T) -> Result<(), StorageError> {
        let command = self.table.builder().insert_returning(&self.natural_values(value)?, &[self.identity.clone()])?;
        let mut row = self.table.query_first(command).await?.ok_or_else(|| StorageError::failed(format!("{}: insert returned no identity", self.table.label())))?;
        let generated = row.shift_remove(&self.identity).flatten();
        debug!("SqlList({}).add: {} = {:?}", self.table.label(), self.identity, generated);
        self.mapper.assign(value, &self.identity, generated)?;
        Ok(())
    }

    async fn remove_all(&self, value: &T) -> Result<u64, StorageError> {
        let command = self.table.builder().delete(&match_filter(&self.natural_values(value)?))?;
        self.table.execute(command).await
    }

    async fn range(&self, skip: u64, take: Option<u64>) -> Result<QueryResult<T>, StorageError> {
        let options = SelectOptions {
            skip: Some(skip),
            take,
            order_by: vec![OrderByItem { field: self.identity.clone(), direction: OrderDirection::Asc }],
            ..Default::default()
        };
        Ok(self.stream(self.table.builder().select(&self.columns(), &Predicate::True, &options)?))
    }

    async fn query(&self, selection: &Selection, options: QueryOptions) -> Result<QueryResult<T>, StorageError> {
        let columns = self.columns();
        let builder = self.table.builder();
        let mut select_options = SelectOptions { distinct: options.distinct, ..SelectOptions::from(selection) };
        if select_options.order_by.is_empty() {
            select_options.order_by.push(OrderByItem { field: self.identity.clone(), direction: OrderDirection::Asc });
        }
        let mut result = self.stream(builder.select(&columns, &selection.predicate, &select_options)?);
        if options.with_total {
            result.total = Some(self.table.count(builder.count(&selection.predicate, options.distinct.then_some(columns.as_slice()))?).await?);
        }
        Ok(result)
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StorageError> { self.table.count(self.table.builder().count(predicate, None)?).await }
}

#[async_trait]
impl<T, D> SchemaAware for SqlList<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    async fn ensure_schema(&self) -> Result<(), StorageError> { self.table.ensure_schema().await }
}
