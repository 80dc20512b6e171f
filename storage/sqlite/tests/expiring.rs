mod common;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::{memory, string_key, string_value};
use tessera_core::collections::{ExpiringMap, PropertyMap, StorageMap};
use tessera_core::{StorageError, Value};
use tessera_storage_common::{ExpiringSqlMap, TableOptions};
use tessera_storage_sqlite::SqliteDriver;
use tessql::Predicate;

async fn cache() -> Result<ExpiringSqlMap<String, String, SqliteDriver>> {
    Ok(memory().await?.expiring_map(&TableOptions::new("cache"), string_key("Key"), string_value("Value"))?)
}

#[tokio::test]
async fn test_expired_entries_are_invisible() -> Result<()> {
    let cache = cache().await?;
    let key = "session".to_string();
    cache.try_add(&key, &"token".into(), false).await?;
    assert!(cache.set_relative_expiration(&key, Duration::from_millis(50)).await?);
    assert!(cache.get_expiration(&key).await?.is_some());
    assert_eq!(cache.get(&key).await?, Some("token".to_string()));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(cache.get(&key).await?, None);
    assert!(!cache.contains_key(&key).await?);
    assert_eq!(StorageMap::count(&cache, &Predicate::True).await?, 0);

    // an expired entry counts as absent and the new one carries no expiration
    assert!(cache.try_add(&key, &"fresh".into(), false).await?);
    assert_eq!(cache.get(&key).await?, Some("fresh".to_string()));
    assert_eq!(cache.get_expiration(&key).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_absolute_expiration_and_purge() -> Result<()> {
    let cache = cache().await?;
    for key in ["a", "b", "c"] {
        cache.try_add(&key.to_string(), &key.to_uppercase(), false).await?;
    }
    let past = Utc::now() - chrono::Duration::seconds(5);
    let future = Utc::now() + chrono::Duration::hours(1);
    assert!(cache.set_absolute_expiration(&"a".into(), past).await?);
    assert!(cache.set_absolute_expiration(&"b".into(), future).await?);

    assert_eq!(cache.get(&"a".into()).await?, None);
    assert_eq!(cache.get(&"b".into()).await?, Some("B".to_string()));
    let expiration = cache.get_expiration(&"b".into()).await?.expect("b expires");
    assert!((expiration - future).num_milliseconds().abs() < 1, "{} vs {}", expiration, future);

    // an expired entry can no longer be given a new expiration
    assert!(!cache.set_absolute_expiration(&"a".into(), future).await?);

    assert_eq!(cache.purge_expired().await?, 1);
    assert_eq!(cache.purge_expired().await?, 0);
    assert_eq!(StorageMap::count(&cache, &Predicate::True).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_remove_expiration() -> Result<()> {
    let cache = cache().await?;
    let key = "k".to_string();
    assert!(!cache.remove_expiration(&key).await?);
    cache.try_add(&key, &"v".into(), false).await?;
    assert!(!cache.remove_expiration(&key).await?);

    cache.set_relative_expiration(&key, Duration::from_secs(60)).await?;
    assert!(cache.remove_expiration(&key).await?);
    assert_eq!(cache.get_expiration(&key).await?, None);
    assert!(!cache.set_relative_expiration(&"missing".into(), Duration::from_secs(1)).await?);
    Ok(())
}

#[tokio::test]
async fn test_overwrite_clears_expiration() -> Result<()> {
    let cache = cache().await?;
    let key = "k".to_string();
    cache.try_add(&key, &"v1".into(), false).await?;
    cache.set_relative_expiration(&key, Duration::from_secs(60)).await?;

    // present and live: not replaced, expiration kept
    assert!(!cache.try_add(&key, &"v2".into(), false).await?);
    assert!(cache.get_expiration(&key).await?.is_some());

    assert!(cache.try_add(&key, &"v3".into(), true).await?);
    assert_eq!(cache.get(&key).await?, Some("v3".to_string()));
    assert_eq!(cache.get_expiration(&key).await?, None);
    Ok(())
}

#[tokio::test]
async fn test_custom_expiration_column() -> Result<()> {
    let storage = memory().await?;
    let cache = ExpiringSqlMap::with_expiration_column(
        storage.driver().clone(),
        &TableOptions::new("leases"),
        string_key("Resource"),
        string_value("Holder"),
        "ValidUntil",
        storage.types().clone(),
    )?;
    assert_eq!(cache.expiration_column(), "ValidUntil");
    cache.try_add(&"db".into(), &"worker-1".into(), false).await?;
    assert!(cache.set_relative_expiration(&"db".into(), Duration::from_secs(30)).await?);
    assert!(cache.table().descriptor().columns().contains_key("ValidUntil"));
    Ok(())
}

#[tokio::test]
async fn test_expired_entries_cannot_be_updated() -> Result<()> {
    let cache = cache().await?;
    let key = "k".to_string();
    cache.try_add(&key, &"v".into(), false).await?;
    assert!(cache.try_update(&key, &"v2".into(), &"v".into()).await?);
    cache.set_property_value(&key, "Value", Some(Value::from("v3"))).await?;
    assert_eq!(cache.get(&key).await?, Some("v3".to_string()));

    assert!(cache.set_absolute_expiration(&key, Utc::now() - chrono::Duration::seconds(1)).await?);
    assert!(!cache.try_update(&key, &"v4".into(), &"v3".into()).await?);
    let err = cache.set_property_value(&key, "Value", Some(Value::from("v5"))).await.unwrap_err();
    assert!(matches!(err, StorageError::OperationFailed(_)), "{:?}", err);
    assert_eq!(cache.get_property_value(&key, "Value").await?, None);

    // the row stays stored until purged
    assert_eq!(cache.purge_expired().await?, 1);
    Ok(())
}
