mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::{people, storage, storage_with, string_key, string_value, Person};
use futures::StreamExt;
use tessera_core::collections::StorageMap;
use tessera_core::{QueryOptions, StorageError};
use tessera_storage_common::{Driver, DriverOptions, ReadReplica, SqlMap, TableOptions, TypeMap};
use tessera_storage_postgres::PostgresDriver;
use tessql::{field, OrderDirection, Predicate, Selection};
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires docker"]
async fn test_replica_routes_reads_and_refuses_reader_writes() -> Result<()> {
    let (_container, connection_string, _) = storage().await?;
    let replica = ReadReplica::open::<PostgresDriver, _>(&connection_string, DriverOptions::default(), &TableOptions::new("people"), |driver, options| {
        SqlMap::new(driver, options, string_key("Id"), people(), Arc::new(TypeMap::standard()))
    })
    .await?;

    assert!(replica.try_add(&"p1".into(), &Person::new("Alice", 30), false).await?);
    assert_eq!(replica.get(&"p1".into()).await?, Some(Person::new("Alice", 30)));
    assert_eq!(replica.count(&field("Age").gt(26)).await?, 1);

    let err = replica.reader().try_add(&"p2".into(), &Person::new("Eve", 1), false).await.unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)), "{:?}", err);

    let err = ReadReplica::open::<PostgresDriver, _>(
        &PostgresDriver::read_only_connection_string(&connection_string),
        DriverOptions::default(),
        &TableOptions::new("people"),
        |driver, options| SqlMap::new(driver, options, string_key("Id"), people(), Arc::new(TypeMap::standard())),
    )
    .await
    .err()
    .expect("marker rejected");
    assert!(matches!(err, StorageError::InvalidArgument(_)), "{:?}", err);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_streaming_reads_release_the_connection() -> Result<()> {
    let (_container, _, storage) = storage_with(DriverOptions { pool_size: 1, ..Default::default() }).await?;
    let map = storage.map(&TableOptions::new("numbers"), string_key("Key"), string_value("Value"))?;
    for i in 0..300 {
        map.try_add(&format!("k{:04}", i), &i.to_string(), false).await?;
    }

    let mut result = map.query(&Selection::all().order_by("Key", OrderDirection::Asc), QueryOptions::with_total()).await?;
    assert_eq!(result.total, Some(300));
    for expected in 0..3 {
        let (key, _) = result.items.next().await.expect("row")?;
        assert_eq!(key, format!("k{:04}", expected));
    }
    drop(result);

    // one pooled connection: this waits forever if the abandoned reader kept it
    let count = tokio::time::timeout(Duration::from_secs(10), StorageMap::count(&map, &Predicate::True)).await??;
    assert_eq!(count, 300);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cancelled_token_fails_operations() -> Result<()> {
    let (_container, _, storage) = storage().await?;
    let map = storage.map(&TableOptions::new("cancel"), string_key("Key"), string_value("Value"))?;
    map.try_add(&"a".into(), &"1".into(), false).await?;

    let token = CancellationToken::new();
    let guarded = map.cancellable(token.clone());
    token.cancel();
    let err = guarded.get(&"a".into()).await.unwrap_err();
    assert!(err.is_cancellation(), "{:?}", err);

    // the unguarded map is unaffected
    assert_eq!(map.get(&"a".into()).await?, Some("1".to_string()));
    Ok(())
}
