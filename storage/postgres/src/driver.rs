use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8_postgres::PostgresConnectionManager;
use futures::{stream, StreamExt};
use tessera_core::{ColumnValues, StorageError};
use tessera_storage_common::{Command, Dialect, Driver, DriverOptions, RowStream, SqlConnection};
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, Client, NoTls};
use tracing::{debug, warn};

use crate::dialect::PostgresDialect;
use crate::error::PostgresError;
use crate::params::to_positional;
use crate::value::{read_row, PgValue};

type Manager = PostgresConnectionManager<NoTls>;

/// Postgres driver over a bb8 pool of tokio-postgres clients.
///
/// The connection string is anything `tokio_postgres::Config` parses: `host=... user=...` pairs or
/// a `postgres://` URL.
pub struct PostgresDriver {
    pool: bb8::Pool<Manager>,
    dialect: Arc<PostgresDialect>,
    options: DriverOptions,
}

impl PostgresDriver {
    pub async fn with_config(config: tokio_postgres::Config, options: DriverOptions) -> Result<Self, StorageError> {
        debug!("PostgresDriver: opening {:?} with up to {} connection(s)", config.get_hosts(), options.pool_size);
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = bb8::Pool::builder()
            .max_size(options.pool_size)
            .connection_timeout(options.command_timeout)
            .build(manager)
            .await
            .map_err(PostgresError::from)?;
        Ok(Self { pool, dialect: Arc::new(PostgresDialect), options })
    }

    pub fn pool(&self) -> &bb8::Pool<Manager> { &self.pool }
}

#[async_trait]
impl Driver for PostgresDriver {
    type Connection = PostgresConnection;

    const READ_ONLY_MARKER: &'static str = "default_transaction_read_only=on";

    async fn open_with(connection_string: &str, options: DriverOptions) -> Result<Self, StorageError> {
        let config = tokio_postgres::Config::from_str(connection_string).map_err(|err| PostgresError::Config(err.to_string()))?;
        Self::with_config(config, options).await
    }

    /// Sets `default_transaction_read_only` through the startup `options` parameter. An `options`
    /// value already in the string is kept and the marker appended to it; the later parameter wins.
    fn read_only_connection_string(connection_string: &str) -> String {
        let connection_string = connection_string.trim();
        let options = match existing_options(connection_string) {
            Some(existing) => format!("{} -c {}", existing, Self::READ_ONLY_MARKER),
            None => format!("-c {}", Self::READ_ONLY_MARKER),
        };
        if is_url(connection_string) {
            let separator = if connection_string.contains('?') { '&' } else { '?' };
            format!("{}{}options={}", connection_string, separator, url_encode(&options))
        } else {
            format!("{} options='{}'", connection_string, options.replace('\\', "\\\\").replace('\'', "\\'"))
        }
    }

    /// True when the startup options set `default_transaction_read_only` to an on value, however
    /// it is spelled (`-c key=on`, `-ckey=true`, `--key=1`).
    fn has_read_only_marker(connection_string: &str) -> bool {
        let Some(options) = existing_options(connection_string.trim()) else { return false };
        let mut tokens = options.split_whitespace();
        while let Some(token) = tokens.next() {
            let setting = match token {
                "-c" => match tokens.next() {
                    Some(next) => next,
                    None => break,
                },
                t => t.strip_prefix("--").or_else(|| t.strip_prefix("-c")).unwrap_or(t),
            };
            if let Some((key, value)) = setting.split_once('=') {
                if key.trim().replace('-', "_").eq_ignore_ascii_case("default_transaction_read_only")
                    && matches!(value.trim().to_ascii_lowercase().as_str(), "on" | "true" | "yes" | "1")
                {
                    return true;
                }
            }
        }
        false
    }

    fn dialect(&self) -> Arc<dyn Dialect> { self.dialect.clone() }

    fn command_timeout(&self) -> Duration { self.options.command_timeout }

    async fn connect(&self) -> Result<PostgresConnection, StorageError> {
        let client = self.pool.get_owned().await.map_err(PostgresError::from)?;
        Ok(PostgresConnection { client: Some(client), in_transaction: false })
    }
}

/// One checked-out client.
///
/// A statement whose future is dropped before it completes is cancelled on the server. Dropped
/// inside a transaction, the connection rolls back on the runtime before returning to the pool.
pub struct PostgresConnection {
    client: Option<bb8::PooledConnection<'static, Manager>>,
    in_transaction: bool,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Client, PostgresError> { self.client.as_deref().ok_or(PostgresError::Released) }

    async fn run_control(&mut self, command: &Command) -> Result<(), StorageError> {
        debug!("PostgresConnection: {}", command.sql);
        let client = self.client()?;
        let mut cancel = CancelOnDrop::arm(client.cancel_token());
        client.batch_execute(&command.sql).await.map_err(PostgresError::from)?;
        cancel.disarm();
        Ok(())
    }
}

fn is_url(connection_string: &str) -> bool { connection_string.starts_with("postgres://") || connection_string.starts_with("postgresql://") }

/// The non-empty `options` value of a connection string that parses.
fn existing_options(connection_string: &str) -> Option<String> {
    let config = tokio_postgres::Config::from_str(connection_string).ok()?;
    config.get_options().map(str::trim).filter(|o| !o.is_empty()).map(str::to_owned)
}

fn url_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'=' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn bound(values: &[PgValue]) -> Vec<&(dyn ToSql + Sync)> { values.iter().map(|v| v as &(dyn ToSql + Sync)).collect() }

#[async_trait]
impl SqlConnection for PostgresConnection {
    async fn execute(&mut self, command: &Command) -> Result<u64, StorageError> {
        let positional = to_positional(&command.sql, &command.parameters)?;
        let values: Vec<PgValue> = positional.values.into_iter().map(PgValue).collect();
        let client = self.client()?;
        let mut cancel = CancelOnDrop::arm(client.cancel_token());
        let affected = client.execute(positional.sql.as_str(), &bound(&values)).await.map_err(PostgresError::from)?;
        cancel.disarm();
        Ok(affected)
    }

    async fn query(&mut self, command: &Command) -> Result<Vec<ColumnValues>, StorageError> {
        let positional = to_positional(&command.sql, &command.parameters)?;
        let values: Vec<PgValue> = positional.values.into_iter().map(PgValue).collect();
        let client = self.client()?;
        let mut cancel = CancelOnDrop::arm(client.cancel_token());
        let rows = client.query(positional.sql.as_str(), &bound(&values)).await.map_err(PostgresError::from)?;
        cancel.disarm();
        Ok(rows.iter().map(read_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn into_rows(self, command: Command) -> Result<RowStream, StorageError> {
        let positional = to_positional(&command.sql, &command.parameters)?;
        let values: Vec<PgValue> = positional.values.into_iter().map(PgValue).collect();
        let client = self.client()?;
        let cancel = CancelOnDrop::arm(client.cancel_token());
        let rows = client.query_raw(positional.sql.as_str(), values).await.map_err(PostgresError::from)?;

        let cursor = RowCursor { rows: Box::pin(rows), cancel, _connection: self };
        Ok(Box::pin(stream::unfold(cursor, |mut cursor| async move {
            match cursor.rows.next().await {
                Some(Ok(row)) => Some((read_row(&row).map_err(StorageError::from), cursor)),
                Some(Err(err)) => {
                    cursor.cancel.disarm();
                    Some((Err(PostgresError::from(err).into()), cursor))
                }
                None => {
                    cursor.cancel.disarm();
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

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        let Some(client) = self.client.take() else { return };
        warn!("PostgresConnection: dropped inside a transaction, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = client.batch_execute("ROLLBACK").await {
                        warn!("PostgresConnection: background rollback failed: {}", err);
                    }
                });
            }
            // no runtime left to talk to the server; the next BEGIN on this client reports the open transaction
            Err(_) => drop(client),
        }
    }
}

/// Cancels the running statement unless disarmed first.
struct CancelOnDrop(Option<CancelToken>);

impl CancelOnDrop {
    fn arm(token: CancelToken) -> Self { Self(Some(token)) }

    fn disarm(&mut self) { self.0 = None; }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(token) = self.0.take() else { return };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            debug!("PostgresConnection: cancelling abandoned statement");
            handle.spawn(async move {
                if let Err(err) = token.cancel_query(NoTls).await {
                    debug!("PostgresConnection: cancel request failed: {}", err);
                }
            });
        }
    }
}

/// A streaming read in progress. Fields drop in order: rows, the cancel guard, then the client.
struct RowCursor {
    rows: Pin<Box<tokio_postgres::RowStream>>,
    cancel: CancelOnDrop,
    _connection: PostgresConnection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_connection_strings() {
        assert_eq!(
            PostgresDriver::read_only_connection_string("host=db user=app dbname=shop"),
            "host=db user=app dbname=shop options='-c default_transaction_read_only=on'"
        );
        assert_eq!(
            PostgresDriver::read_only_connection_string("postgres://app@db/shop"),
            "postgres://app@db/shop?options=-c%20default_transaction_read_only=on"
        );
        assert_eq!(
            PostgresDriver::read_only_connection_string("postgresql://app@db/shop?sslmode=disable"),
            "postgresql://app@db/shop?sslmode=disable&options=-c%20default_transaction_read_only=on"
        );
    }

    #[test]
    fn test_read_only_strings_parse() {
        for cs in ["host=db user=app", "postgres://app@db/shop"] {
            let config = tokio_postgres::Config::from_str(&PostgresDriver::read_only_connection_string(cs)).unwrap();
            assert_eq!(config.get_options(), Some("-c default_transaction_read_only=on"));
        }
    }

    #[test]
    fn test_existing_options_are_kept() {
        for cs in ["host=db options='-c search_path=app'", "postgres://app@db/shop?options=-c%20search_path%3Dapp"] {
            let read_only = PostgresDriver::read_only_connection_string(cs);
            let config = tokio_postgres::Config::from_str(&read_only).unwrap();
            assert_eq!(config.get_options(), Some("-c search_path=app -c default_transaction_read_only=on"), "{}", read_only);
            assert!(PostgresDriver::has_read_only_marker(&read_only));
        }
    }

    #[test]
    fn test_read_only_marker_spellings() {
        for cs in [
            "host=db options='-c default_transaction_read_only=on'",
            "host=db options='-c DEFAULT_TRANSACTION_READ_ONLY=ON'",
            "host=db options='-c default_transaction_read_only=true'",
            "host=db options='-cdefault_transaction_read_only=1'",
            "host=db options='--default-transaction-read-only=yes'",
            "postgres://app@db/shop?options=-c%20default_transaction_read_only%3DOn",
        ] {
            assert!(PostgresDriver::has_read_only_marker(cs), "{}", cs);
        }
        for cs in ["host=db", "host=db options='-c default_transaction_read_only=off'", "host=db options='-c search_path=app'", "host=db port=notaport"] {
            assert!(!PostgresDriver::has_read_only_marker(cs), "{}", cs);
        }
    }

    #[tokio::test]
    async fn test_bad_connection_string_is_invalid_argument() {
        let err = PostgresDriver::open("host=db port=notaport").await.err().unwrap();
        assert!(matches!(err, StorageError::InvalidArgument(_)), "{:?}", err);
    }
}
