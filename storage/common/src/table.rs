use std::sync::Arc;

use tessera_core::{ColumnValues, FromValue, StorageError, TableDescriptor, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::builder::CommandBuilder;
use crate::command::{Command, CommandAugmenter};
use crate::driver::{Driver, RowStream, SqlConnection};
use crate::reader::read_lazily;
use crate::schema::SchemaSynchronizer;
use crate::scope::OperationScope;
use crate::translate::Aliases;
use crate::types::TypeMap;

/// Plumbing shared by the collection engines: one table, its statement builder, its schema state,
/// and the scope every operation runs in.
pub struct SqlTable<D: Driver> {
    driver: Arc<D>,
    builder: CommandBuilder,
    schema: Arc<SchemaSynchronizer>,
    scope: OperationScope,
}

impl<D: Driver> Clone for SqlTable<D> {
    fn clone(&self) -> Self { Self { driver: self.driver.clone(), builder: self.builder.clone(), schema: self.schema.clone(), scope: self.scope.clone() } }
}

impl<D: Driver> SqlTable<D> {
    pub fn new(driver: Arc<D>, descriptor: TableDescriptor, types: Arc<TypeMap>) -> Self {
        let builder = CommandBuilder::new(driver.dialect(), types, Arc::new(descriptor));
        let scope = OperationScope::new(driver.command_timeout());
        Self { schema: Arc::new(SchemaSynchronizer::new(builder.clone())), driver, builder, scope }
    }

    pub fn with_aliases(mut self, aliases: Aliases) -> Self {
        self.builder = self.builder.with_aliases(aliases);
        self
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn CommandAugmenter>) -> Self {
        self.builder = self.builder.with_augmenter(augmenter);
        self
    }

    /// A handle whose operations abort with [`StorageError::Cancelled`] once `token` fires.
    pub fn cancellable(&self, token: CancellationToken) -> Self { Self { scope: self.scope.clone().with_token(token), ..self.clone() } }

    pub fn builder(&self) -> &CommandBuilder { &self.builder }

    pub fn descriptor(&self) -> &TableDescriptor { self.builder.table() }

    pub fn driver(&self) -> &Arc<D> { &self.driver }

    pub fn scope(&self) -> &OperationScope { &self.scope }

    pub fn schema_converged(&self) -> bool { self.schema.is_converged() }

    /// Short label for log lines.
    pub fn label(&self) -> String { self.descriptor().qualified_name() }

    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        if self.schema.is_converged() || !self.descriptor().synchronize_schema() {
            return Ok(());
        }
        self.scope.run(async { self.connection().await.map(drop) }).await
    }

    /// A connection with the table's schema already ensured.
    pub async fn connection(&self) -> Result<D::Connection, StorageError> {
        let mut connection = self.driver.connect().await?;
        self.schema.ensure(&mut connection).await?;
        Ok(connection)
    }

    pub async fn execute(&self, command: Command) -> Result<u64, StorageError> {
        debug!("SqlTable({}).execute: {}", self.label(), command.sql);
        self.scope.run(async { self.connection().await?.execute(&command).await }).await
    }

    /// Buffered rows, coerced to the command's projection.
    pub async fn query(&self, command: Command) -> Result<Vec<ColumnValues>, StorageError> {
        debug!("SqlTable({}).query: {}", self.label(), command.sql);
        let rows = self.scope.run(async { self.connection().await?.query(&command).await }).await?;
        let types = self.builder.types();
        rows.into_iter().map(|row| types.coerce_row(row, &command.projection).map_err(StorageError::from)).collect()
    }

    pub async fn query_first(&self, command: Command) -> Result<Option<ColumnValues>, StorageError> { Ok(self.query(command).await?.into_iter().next()) }

    /// First column of the first row.
    pub async fn scalar(&self, command: Command) -> Result<Option<Value>, StorageError> {
        Ok(self.query_first(command).await?.and_then(|row| row.into_iter().next()).and_then(|(_, value)| value))
    }

    pub async fn count(&self, command: Command) -> Result<u64, StorageError> {
        let count = i64::from_value(self.scalar(command).await?)?;
        u64::try_from(count).map_err(|_| StorageError::failed(format!("negative count {}", count)))
    }

    pub async fn exists(&self, command: Command) -> Result<bool, StorageError> { Ok(i64::from_value(self.scalar(command).await?)? != 0) }

    /// Rows pulled lazily from a dedicated connection.
    pub fn stream(&self, command: Command) -> RowStream {
        let table = self.clone();
        read_lazily(move || async move { table.connection().await }, command, self.scope.clone(), self.builder.types().clone())
    }
}

/// Transactional work on one connection, rolled back on any error.
pub struct Transaction<C: SqlConnection> {
    connection: C,
    rollback: Command,
    commit: Command,
}

impl<C: SqlConnection> Transaction<C> {
    pub async fn begin(mut connection: C, builder: &CommandBuilder, begin: Command) -> Result<Self, StorageError> {
        connection.begin(&begin).await?;
        Ok(Self { connection, rollback: builder.rollback()?, commit: builder.commit()? })
    }

    pub fn connection(&mut self) -> &mut C { &mut self.connection }

    pub async fn commit(mut self) -> Result<(), StorageError> { self.connection.commit(&self.commit).await }

    pub async fn rollback(mut self) -> Result<(), StorageError> { self.connection.rollback(&self.rollback).await }
}
