use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tessera_core::collections::{ScoreRange, StorageSortedSet};
use tessera_core::mapping::take_column;
use tessera_core::{ColumnType, ColumnValues, Mapper, QueryResult, StorageError, Value, ValueType};
use tessql::{field, OrderByItem, OrderDirection, Predicate};
use tokio_util::sync::CancellationToken;

use super::{match_filter, require_key, SchemaAware, TableOptions};
use crate::builder::SelectOptions;
use crate::driver::Driver;
use crate::table::SqlTable;
use crate::types::TypeMap;

pub const DEFAULT_SCORE_COLUMN: &str = "score";

/// Members ordered by a floating-point score. The member columns form the row key.
pub struct SqlSortedSet<T, D: Driver> {
    table: SqlTable<D>,
    mapper: Arc<dyn Mapper<T>>,
    score: String,
}

impl<T, D: Driver> Clone for SqlSortedSet<T, D> {
    fn clone(&self) -> Self { Self { table: self.table.clone(), mapper: self.mapper.clone(), score: self.score.clone() } }
}

impl<T, D> SqlSortedSet<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    pub fn new(driver: Arc<D>, options: &TableOptions, mapper: Arc<dyn Mapper<T>>, types: Arc<TypeMap>) -> Result<Self, StorageError> {
        Self::with_score_column(driver, options, mapper, DEFAULT_SCORE_COLUMN, types)
    }

    pub fn with_score_column(driver: Arc<D>, options: &TableOptions, mapper: Arc<dyn Mapper<T>>, score: &str, types: Arc<TypeMap>) -> Result<Self, StorageError> {
        let members = mapper.columns();
        if members.iter().any(|(name, _)| name == score) {
            return Err(StorageError::argument(format!("score column {} collides with a member column", score)));
        }
        let descriptor = options.descriptor(members, vec![(score.to_owned(), ColumnType::new(ValueType::F64))])?;
        Ok(Self { table: SqlTable::new(driver, descriptor, types), mapper, score: score.to_owned() })
    }

    pub fn table(&self) -> &SqlTable<D> { &self.table }

    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { table: self.table.cancellable(token), ..self.clone() } }

    fn member_values(&self, member: &T) -> Result<ColumnValues, StorageError> {
        let values = self.mapper.to_values(member)?;
        require_key(&self.table.label(), &values)?;
        Ok(values)
    }

    fn score_values(&self, score: f64) -> ColumnValues { ColumnValues::from([(self.score.clone(), Some(Value::F64(score)))]) }

    async fn read_score(&self, filter: &Predicate) -> Result<Option<f64>, StorageError> {
        let command = self.table.builder().select_first(&[self.score.clone()], filter)?;
        match self.table.query_first(command).await? {
            Some(mut row) => Ok(take_column(&mut row, &self.score)?),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<T, D> StorageSortedSet<T> for SqlSortedSet<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    async fn add(&self, member: &T, score: f64) -> Result<(), StorageError> {
        let command = self.table.builder().merge(&self.member_values(member)?, &self.score_values(score), &ColumnValues::new())?;
        self.table.execute(command).await?;
        Ok(())
    }

    async fn increment(&self, member: &T, delta: f64) -> Result<f64, StorageError> {
        let members = self.member_values(member)?;
        let command = self.table.builder().merge_increment(&members, &self.score_values(delta), &self.score)?;
        let mut row = self.table.query_first(command).await?.ok_or_else(|| StorageError::failed(format!("{}: increment returned no row", self.table.label())))?;
        Ok(take_column(&mut row, &self.score)?)
    }

    async fn score(&self, member: &T) -> Result<Option<f64>, StorageError> { self.read_score(&match_filter(&self.member_values(member)?)).await }

    async fn remove(&self, member: &T) -> Result<bool, StorageError> {
        let command = self.table.builder().delete(&match_filter(&self.member_values(member)?))?;
        Ok(self.table.execute(command).await? > 0)
    }

    async fn len(&self) -> Result<u64, StorageError> { self.table.count(self.table.builder().count(&Predicate::True, None)?).await }

    async fn range_by_score(&self, range: ScoreRange) -> Result<QueryResult<(T, f64)>, StorageError> {
        let mut filter = Predicate::True;
        if let Some(min) = range.min {
            filter = filter.and(field(self.score.as_str()).ge(min));
        }
        if let Some(max) = range.max {
            filter = filter.and(field(self.score.as_str()).le(max));
        }
        let direction = if range.descending { OrderDirection::Desc } else { OrderDirection::Asc };
        let options = SelectOptions { skip: range.skip, take: range.take, order_by: vec![OrderByItem { field: self.score.clone(), direction }], ..Default::default() };
        let columns: Vec<String> = self.table.descriptor().columns().keys().cloned().collect();
        let command = self.table.builder().select(&columns, &filter, &options)?;

        let (mapper, score) = (self.mapper.clone(), self.score.clone());
        let items = self.table.stream(command).map(move |row| -> Result<(T, f64), StorageError> {
            let mut row = row?;
            let value: f64 = take_column(&mut row, &score)?;
            Ok((mapper.from_values(&mut row)?, value))
        });
        Ok(QueryResult::new(Box::pin(items), None))
    }
}

#[async_trait]
impl<T, D> SchemaAware for SqlSortedSet<T, D>
where
    T: Send + Sync + 'static,
    D: Driver,
{
    async fn ensure_schema(&self) -> Result<(), StorageError> { self.table.ensure_schema().await }
}
