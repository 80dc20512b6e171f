mod common;

use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use common::{memory, on_disk, string_key, string_value};
use tessera_core::collections::StorageMap;
use tessera_core::{QueryOptions, StorageError};
use tessera_storage_common::{DriverOptions, SqlStorage, TableOptions};
use tessera_storage_sqlite::SqliteDriver;
use tessql::{Predicate, Selection};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_rows_stream_in_order() -> Result<()> {
    let storage = memory().await?;
    let map = storage.map(&TableOptions::new("numbers"), string_key("Key"), string_value("Value"))?;
    for i in 0..500 {
        map.try_add(&format!("k{:04}", i), &i.to_string(), false).await?;
    }

    let mut result = map.query(&Selection::all().order_by("Key", tessql::OrderDirection::Asc), QueryOptions::with_total()).await?;
    assert_eq!(result.total, Some(500));
    let mut seen = 0;
    while let Some(row) = result.items.next().await {
        let (key, _) = row?;
        assert_eq!(key, format!("k{:04}", seen));
        seen += 1;
    }
    assert_eq!(seen, 500);
    Ok(())
}

#[tokio::test]
async fn test_nothing_runs_until_polled() -> Result<()> {
    let storage = memory().await?;
    let map = storage.map(&TableOptions::new("lazy"), string_key("Key"), string_value("Value"))?;
    map.try_add(&"a".into(), &"1".into(), false).await?;

    // the single in-memory connection stays free while the result is unpolled
    let pending = map.query(&Selection::all(), QueryOptions::default()).await?;
    assert!(map.try_add(&"b".into(), &"2".into(), false).await?);
    assert_eq!(pending.collect().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_abandoned_reader_releases_its_connection() -> Result<()> {
    let storage = memory().await?;
    let map = storage.map(&TableOptions::new("numbers"), string_key("Key"), string_value("Value"))?;
    for i in 0..300 {
        map.try_add(&format!("k{}", i), &"v".into(), false).await?;
    }

    let mut result = map.query(&Selection::all(), QueryOptions::default()).await?;
    for _ in 0..3 {
        assert!(result.items.next().await.transpose()?.is_some());
    }
    drop(result);

    // the in-memory pool has one connection; this would time out if the reader still held it
    let count = tokio::time::timeout(Duration::from_secs(5), StorageMap::count(&map, &Predicate::True)).await??;
    assert_eq!(count, 300);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_token_fails_operations() -> Result<()> {
    let storage = memory().await?;
    let map = storage.map(&TableOptions::new("cancel"), string_key("Key"), string_value("Value"))?;
    map.try_add(&"a".into(), &"1".into(), false).await?;

    let token = CancellationToken::new();
    let guarded = map.cancellable(token.clone());
    assert_eq!(guarded.get(&"a".into()).await?, Some("1".to_string()));

    token.cancel();
    let err = guarded.get(&"a".into()).await.unwrap_err();
    assert!(err.is_cancellation(), "{:?}", err);

    let result = guarded.query(&Selection::all(), QueryOptions::default()).await?;
    let mut items = result.items;
    assert!(matches!(items.next().await, Some(Err(StorageError::Cancelled))));
    assert!(items.next().await.is_none());

    // the uncancelled map is unaffected
    assert!(map.contains_key(&"a".into()).await?);
    Ok(())
}

#[tokio::test]
async fn test_cancelling_mid_stream_ends_it() -> Result<()> {
    let (_dir, _, storage) = on_disk().await?;
    let map = storage.map(&TableOptions::new("numbers"), string_key("Key"), string_value("Value"))?;
    for i in 0..200 {
        map.try_add(&format!("k{}", i), &"v".into(), false).await?;
    }

    let token = CancellationToken::new();
    let mut items = map.cancellable(token.clone()).query(&Selection::all(), QueryOptions::default()).await?.items;
    assert!(items.next().await.transpose()?.is_some());
    token.cancel();
    assert!(matches!(items.next().await, Some(Err(StorageError::Cancelled))));
    assert!(items.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_timeout_bounds_connection_wait() -> Result<()> {
    let driver = SqliteDriver::with_config(
        tessera_storage_sqlite::SqliteConfig::memory(),
        DriverOptions { command_timeout: Duration::from_millis(200), ..Default::default() },
    )
    .await?;
    let storage = SqlStorage::new(std::sync::Arc::new(driver));
    let map = storage.map(&TableOptions::new("busy"), string_key("Key"), string_value("Value"))?;
    map.try_add(&"a".into(), &"1".into(), false).await?;

    // hold the only connection with an open reader
    let mut reader = map.query(&Selection::all(), QueryOptions::default()).await?.items;
    assert!(reader.next().await.transpose()?.is_some());

    let err = map.get(&"a".into()).await.unwrap_err();
    assert!(matches!(err, StorageError::Timeout(_) | StorageError::Backend(_)), "{:?}", err);
    drop(reader);
    Ok(())
}
