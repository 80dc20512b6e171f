//! Connection-string parsing.
//!
//! `<target>[;key=value]...` where target is a file path, `:memory:` or a `file:` URI.
//! Options: `read_only`, `pool_size`, `busy_timeout_ms`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SqliteError;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SqliteTarget {
    File(PathBuf),
    /// A private database per connection, so the pool holds exactly one.
    Memory,
    Uri(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqliteConfig {
    pub target: SqliteTarget,
    pub read_only: bool,
    pub pool_size: Option<u32>,
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self { Self::new(SqliteTarget::File(path.into())) }

    pub fn memory() -> Self { Self::new(SqliteTarget::Memory) }

    fn new(target: SqliteTarget) -> Self { Self { target, read_only: false, pool_size: None, busy_timeout: DEFAULT_BUSY_TIMEOUT } }

    pub fn parse(connection_string: &str) -> Result<Self, SqliteError> {
        let mut parts = connection_string.split(';').map(str::trim);
        let target = match parts.next() {
            None | Some("") => return Err(SqliteError::Config("missing database path".into())),
            Some(":memory:") => SqliteTarget::Memory,
            Some(uri) if uri.starts_with("file:") => SqliteTarget::Uri(uri.to_owned()),
            Some(path) => SqliteTarget::File(PathBuf::from(path)),
        };
        let mut config = Self::new(target);
        for part in parts.filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| SqliteError::Config(format!("expected key=value, got {}", part)))?;
            let (key, value) = (key.trim().to_ascii_lowercase(), value.trim());
            match key.as_str() {
                "read_only" => config.read_only = parse_bool(value)?,
                "pool_size" => config.pool_size = Some(parse_number(&key, value)? as u32),
                "busy_timeout_ms" => config.busy_timeout = Duration::from_millis(parse_number(&key, value)?),
                _ => return Err(SqliteError::Config(format!("unknown option {}", key))),
            }
        }
        Ok(config)
    }

    /// Pool size for this target. An in-memory database only lives as long as its one connection.
    pub fn pool_size(&self, requested: u32) -> u32 {
        match self.target {
            SqliteTarget::Memory => 1,
            _ => self.pool_size.unwrap_or(requested).max(1),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, SqliteError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(SqliteError::Config(format!("expected a boolean, got {}", value))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, SqliteError> {
    value.parse().map_err(|_| SqliteError::Config(format!("{} expects a number, got {}", key, value)))
}
