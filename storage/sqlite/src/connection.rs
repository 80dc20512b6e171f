//! Connection manager for bb8 pool with rusqlite

use std::sync::Arc;

use rusqlite::{Connection, InterruptHandle, OpenFlags};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{SqliteConfig, SqliteTarget};
use crate::error::SqliteError;

/// Opens rusqlite connections for a bb8 pool.
///
/// rusqlite connections are blocking, so every call runs on the blocking thread pool.
pub struct SqliteConnectionManager {
    config: SqliteConfig,
}

impl SqliteConnectionManager {
    pub fn new(config: SqliteConfig) -> Self { Self { config } }

    pub fn config(&self) -> &SqliteConfig { &self.config }

    fn create_connection(config: &SqliteConfig) -> Result<Connection, SqliteError> {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        flags |= match config.read_only {
            true => OpenFlags::SQLITE_OPEN_READ_ONLY,
            false => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        let conn = match &config.target {
            SqliteTarget::File(path) => Connection::open_with_flags(path, flags)?,
            SqliteTarget::Uri(uri) => Connection::open_with_flags(uri, flags)?,
            SqliteTarget::Memory => Connection::open_in_memory_with_flags(flags)?,
        };
        conn.busy_timeout(config.busy_timeout)?;

        if config.read_only {
            conn.execute_batch("PRAGMA query_only=ON;")?;
        } else {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )?;
        }
        conn.execute_batch(
            "PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;",
        )?;
        debug!("SqliteConnectionManager: opened {:?} (read_only={})", config.target, config.read_only);
        Ok(conn)
    }
}

/// A pooled SQLite connection.
///
/// The rusqlite connection sits behind a mutex so blocking tasks can borrow it; the interrupt
/// handle stays reachable from async code while a statement runs.
pub struct PooledConnection {
    inner: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl PooledConnection {
    pub fn new(conn: Connection) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self { inner: Arc::new(Mutex::new(conn)), interrupt }
    }

    /// Run `f` on the blocking pool. If the returned future is dropped before `f` finishes, the
    /// running statement is interrupted.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, SqliteError>
    where
        F: FnOnce(&mut Connection) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.clone();
        let mut guard = InterruptOnDrop::arm(self.interrupt.clone());
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| SqliteError::TaskJoin(e.to_string()));
        guard.disarm();
        result?
    }

    pub(crate) fn shared(&self) -> Arc<Mutex<Connection>> { self.inner.clone() }

    pub(crate) fn interrupt_handle(&self) -> Arc<InterruptHandle> { self.interrupt.clone() }
}

impl Clone for PooledConnection {
    fn clone(&self) -> Self { Self { inner: self.inner.clone(), interrupt: self.interrupt.clone() } }
}

/// Interrupts the connection's running statement when dropped while armed.
pub(crate) struct InterruptOnDrop {
    handle: Option<Arc<InterruptHandle>>,
}

impl InterruptOnDrop {
    pub(crate) fn arm(handle: Arc<InterruptHandle>) -> Self { Self { handle: Some(handle) } }

    pub(crate) fn disarm(&mut self) { self.handle = None; }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("SqliteConnection: interrupting abandoned statement");
            handle.interrupt();
        }
    }
}

impl bb8::ManageConnection for SqliteConnectionManager {
    type Connection = PooledConnection;
    type Error = SqliteError;

    fn connect(&self) -> impl std::future::Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let config = self.config.clone();
        async move {
            tokio::task::spawn_blocking(move || Self::create_connection(&config).map(PooledConnection::new))
                .await
                .map_err(|e| SqliteError::TaskJoin(e.to_string()))?
        }
    }

    #[allow(refining_impl_trait)]
    fn is_valid<'a, 'b>(&'a self, conn: &'b mut Self::Connection) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let conn = conn.clone();
        async move { conn.with_connection(|c| c.execute_batch("SELECT 1").map_err(SqliteError::from)).await }
    }

    /// A connection handed back mid-transaction is not reusable.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        match conn.inner.try_lock() {
            Ok(guard) => !guard.is_autocommit(),
            Err(_) => false,
        }
    }
}
