use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tessera_core::mapping::take_column;
use tessera_core::StorageError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::builder::CommandBuilder;
use crate::driver::SqlConnection;

/// Brings the live table in line with its descriptor, once per engine instance.
///
/// Tables are created when missing and declared columns are added or retyped. Columns are never
/// dropped. Concurrent callers serialize on a lock; after the first successful run every call is
/// a flag check.
pub struct SchemaSynchronizer {
    builder: CommandBuilder,
    converged: AtomicBool,
    ddl_lock: Mutex<()>,
}

impl SchemaSynchronizer {
    pub fn new(builder: CommandBuilder) -> Self { Self { builder, converged: AtomicBool::new(false), ddl_lock: Mutex::new(()) } }

    pub fn is_converged(&self) -> bool { self.converged.load(Ordering::Acquire) }

    pub async fn ensure<C: SqlConnection>(&self, connection: &mut C) -> Result<(), StorageError> {
        if !self.builder.table().synchronize_schema() || self.is_converged() {
            return Ok(());
        }
        let _guard = self.ddl_lock.lock().await;
        if self.is_converged() {
            return Ok(());
        }
        self.create_table_if_missing(connection).await?;
        self.reconcile_columns(connection).await?;
        self.converged.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn create_table_if_missing<C: SqlConnection>(&self, connection: &mut C) -> Result<(), StorageError> {
        let table = self.builder.table().qualified_name();
        if let Some(command) = self.builder.create_schema()? {
            debug!("SchemaSynchronizer({}).create_schema: {}", table, command.sql);
            connection.execute(&command).await?;
        }
        let command = self.builder.create_table()?;
        debug!("SchemaSynchronizer({}).create_table: {}", table, command.sql);
        connection.execute(&command).await?;
        Ok(())
    }

    /// Add missing columns and retype mismatched ones. Every statement is attempted; the first
    /// failure is reported after the rest have run. Returns the statements that were applied.
    pub async fn reconcile_columns<C: SqlConnection>(&self, connection: &mut C) -> Result<Vec<String>, StorageError> {
        let table = self.builder.table().qualified_name();
        let dialect = self.builder.dialect();

        let mut live = HashMap::new();
        for mut row in connection.query(&self.builder.live_columns()?).await? {
            let name: String = take_column(&mut row, "column_name")?;
            let signature: Option<String> = take_column(&mut row, "signature")?;
            live.insert(name.to_lowercase(), signature.unwrap_or_default());
        }

        let mut pending = Vec::new();
        for (name, column_type) in self.builder.table().columns() {
            let declared = dialect.column_signature(column_type);
            match live.get(&name.to_lowercase()) {
                None => pending.push(self.builder.add_column(name)?),
                Some(signature) if normalize(signature) == normalize(&declared) => {}
                Some(signature) => match self.builder.alter_column(name)? {
                    Some(command) => pending.push(command),
                    None => warn!("SchemaSynchronizer({}): {} cannot retype {} from {} to {}", table, dialect.name(), name, signature, declared),
                },
            }
        }

        let mut applied = Vec::new();
        let mut first_error = None;
        for command in pending {
            match connection.execute(&command).await {
                Ok(_) => {
                    info!("SchemaSynchronizer({}): {}", table, command.sql);
                    applied.push(command.sql);
                }
                Err(err) => {
                    warn!("SchemaSynchronizer({}): {} failed: {}", table, command.sql, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(StorageError::Schema(format!("reconciling {}: {}", table, err))),
            None => Ok(applied),
        }
    }
}

fn normalize(signature: &str) -> String { signature.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect() }
