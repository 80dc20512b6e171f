use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use rusqlite::{Connection, Statement};
use tessera_core::{ColumnValues, StorageError};
use tessera_storage_common::{Command, Dialect, Driver, DriverOptions, Parameters, RowStream, SqlConnection};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::SqliteConfig;
use crate::connection::{InterruptOnDrop, PooledConnection, SqliteConnectionManager};
use crate::dialect::SqliteDialect;
use crate::error::SqliteError;
use crate::value;

/// Rows buffered ahead of a streaming reader.
const STREAM_BUFFER: usize = 64;

/// SQLite driver over a bb8 pool.
pub struct SqliteDriver {
    pool: bb8::Pool<SqliteConnectionManager>,
    dialect: Arc<SqliteDialect>,
    options: DriverOptions,
}

impl SqliteDriver {
    pub async fn with_config(config: SqliteConfig, options: DriverOptions) -> Result<Self, StorageError> {
        let pool_size = config.pool_size(options.pool_size);
        debug!("SqliteDriver: opening {:?} with {} connection(s)", config.target, pool_size);
        let pool = bb8::Pool::builder().max_size(pool_size).connection_timeout(options.command_timeout).build(SqliteConnectionManager::new(config)).await?;
        Ok(Self { pool, dialect: Arc::new(SqliteDialect), options })
    }

    /// A private in-memory database.
    pub async fn memory() -> Result<Self, StorageError> { Self::with_config(SqliteConfig::memory(), DriverOptions::default()).await }

    /// Get a reference to the connection pool (for testing/diagnostics)
    pub fn pool(&self) -> &bb8::Pool<SqliteConnectionManager> { &self.pool }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    const READ_ONLY_MARKER: &'static str = "read_only=true";

    async fn open_with(connection_string: &str, options: DriverOptions) -> Result<Self, StorageError> {
        Self::with_config(SqliteConfig::parse(connection_string)?, options).await
    }

    fn read_only_connection_string(connection_string: &str) -> String {
        format!("{};{}", connection_string.trim_end().trim_end_matches(';'), Self::READ_ONLY_MARKER)
    }

    fn has_read_only_marker(connection_string: &str) -> bool { SqliteConfig::parse(connection_string).map(|config| config.read_only).unwrap_or(false) }

    fn dialect(&self) -> Arc<dyn Dialect> { self.dialect.clone() }

    fn command_timeout(&self) -> Duration { self.options.command_timeout }

    async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        let lease = self.pool.get_owned().await.map_err(SqliteError::from)?;
        Ok(SqliteConnection::new(lease))
    }
}

/// One checked-out connection.
///
/// Dropped inside a transaction, it rolls back on the runtime before returning to the pool.
pub struct SqliteConnection {
    conn: PooledConnection,
    lease: Option<bb8::PooledConnection<'static, SqliteConnectionManager>>,
    in_transaction: bool,
}

impl SqliteConnection {
    fn new(lease: bb8::PooledConnection<'static, SqliteConnectionManager>) -> Self {
        Self { conn: (*lease).clone(), lease: Some(lease), in_transaction: false }
    }

    async fn run<T, F>(&self, command: &Command, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Statement<'_>) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        let sql = command.sql.clone();
        let parameters = command.parameters.clone();
        let result = self
            .conn
            .with_connection(move |c| {
                let mut stmt = c.prepare_cached(&sql)?;
                bind(&mut stmt, &parameters)?;
                f(&mut stmt)
            })
            .await;
        Ok(result?)
    }

    async fn run_control(&self, command: &Command) -> Result<(), StorageError> {
        debug!("SqliteConnection: {}", command.sql);
        self.run(command, |stmt| stmt.raw_execute().map(drop).map_err(SqliteError::from)).await
    }
}

#[async_trait]
impl SqlConnection for SqliteConnection {
    async fn execute(&mut self, command: &Command) -> Result<u64, StorageError> {
        self.run(command, |stmt| Ok(stmt.raw_execute()? as u64)).await
    }

    async fn query(&mut self, command: &Command) -> Result<Vec<ColumnValues>, StorageError> {
        self.run(command, |stmt| {
            let mut rows = Vec::new();
            read_rows(stmt, |row| {
                rows.push(row);
                true
            })?;
            Ok(rows)
        })
        .await
    }

    async fn into_rows(self, command: Command) -> Result<RowStream, StorageError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let shared = self.conn.shared();
        let interrupt = InterruptOnDrop::arm(self.conn.interrupt_handle());
        tokio::task::spawn_blocking(move || {
            let mut conn = shared.blocking_lock();
            if let Err(err) = stream_rows(&mut conn, &command, &tx) {
                // a closed channel means the reader went away first
                let _ = tx.blocking_send(Err(err));
            }
        });

        let cursor = RowCursor { rx, interrupt, _connection: self };
        Ok(Box::pin(stream::unfold(cursor, |mut cursor| async move {
            match cursor.rx.recv().await {
                Some(row) => Some((row.map_err(StorageError::from), cursor)),
                None => {
                    cursor.interrupt.disarm();
                    None
                }
            }
        })))
    }

    async fn begin(&mut self, statement: &Command) -> Result<(), StorageError> {
        self.run_control(statement).await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self, statement: &Command) -> Result<(), StorageError> {
        self.run_control(statement).await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self, statement: &Command) -> Result<(), StorageError> {
        self.run_control(statement).await?;
        self.in_transaction = false;
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        let Some(lease) = self.lease.take() else { return };
        warn!("SqliteConnection: dropped inside a transaction, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let conn = self.conn.clone();
                handle.spawn(async move {
                    if let Err(err) = conn.with_connection(|c| c.execute_batch("ROLLBACK").map_err(SqliteError::from)).await {
                        warn!("SqliteConnection: background rollback failed: {}", err);
                    }
                    drop(lease);
                });
            }
            // no runtime: the pool discards the connection because it is not in autocommit mode
            Err(_) => drop(lease),
        }
    }
}

/// Receiving end of a streaming read. Fields drop in order: reader, then the connection lease.
struct RowCursor {
    rx: mpsc::Receiver<Result<ColumnValues, SqliteError>>,
    interrupt: InterruptOnDrop,
    _connection: SqliteConnection,
}

fn stream_rows(conn: &mut Connection, command: &Command, tx: &mpsc::Sender<Result<ColumnValues, SqliteError>>) -> Result<(), SqliteError> {
    let mut stmt = conn.prepare_cached(&command.sql)?;
    bind(&mut stmt, &command.parameters)?;
    read_rows(&mut stmt, |row| tx.blocking_send(Ok(row)).is_ok())
}

/// Bind every parameter the statement references, by name.
fn bind(stmt: &mut Statement<'_>, parameters: &Parameters) -> Result<(), SqliteError> {
    for index in 1..=stmt.parameter_count() {
        let name = stmt.parameter_name(index).map(str::to_owned).ok_or_else(|| SqliteError::UnboundParameter(format!("?{}", index)))?;
        let value = parameters.get(name.trim_start_matches([':', '@', '$'])).ok_or_else(|| SqliteError::UnboundParameter(name.clone()))?;
        stmt.raw_bind_parameter(index, value::to_sql(value))?;
    }
    Ok(())
}

/// Feed rows to `each` until it returns false or the rows run out.
fn read_rows(stmt: &mut Statement<'_>, mut each: impl FnMut(ColumnValues) -> bool) -> Result<(), SqliteError> {
    let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut values = ColumnValues::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            values.insert(name.clone(), value::from_sql(row.get_ref(index)?));
        }
        if !each(values) {
            break;
        }
    }
    Ok(())
}
