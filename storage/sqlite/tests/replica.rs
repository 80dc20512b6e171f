mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{on_disk, people, string_key, string_value, Person};
use tessera_core::collections::StorageMap;
use tessera_core::{QueryOptions, StorageError};
use tessera_storage_common::{Driver, DriverOptions, ReadReplica, SqlMap, TableOptions, TypeMap};
use tessera_storage_sqlite::SqliteDriver;
use tessql::{field, Selection};

type PeopleReplica = ReadReplica<SqlMap<String, Person, SqliteDriver>>;

async fn open(connection_string: &str) -> Result<PeopleReplica, StorageError> {
    ReadReplica::open::<SqliteDriver, _>(connection_string, DriverOptions::default(), &TableOptions::new("people"), |driver, options| {
        SqlMap::new(driver, options, string_key("Id"), people(), Arc::new(TypeMap::standard()))
    })
    .await
}

#[tokio::test]
async fn test_reads_see_primary_writes() -> Result<()> {
    let (_dir, connection_string, _) = on_disk().await?;
    let replica = open(&connection_string).await?;

    // the first read creates the table through the primary
    assert_eq!(replica.get(&"p1".into()).await?, None);

    assert!(replica.try_add(&"p1".into(), &Person::new("Alice", 30), false).await?);
    assert!(replica.try_add(&"p2".into(), &Person::new("Bob", 25), false).await?);
    assert_eq!(replica.get(&"p1".into()).await?, Some(Person::new("Alice", 30)));
    assert!(replica.contains_key(&"p2".into()).await?);
    assert_eq!(replica.count(&field("Age").gt(26)).await?, 1);

    let all = replica.query(&Selection::all(), QueryOptions::with_total()).await?;
    assert_eq!(all.total, Some(2));
    assert!(replica.try_remove(&"p2".into()).await?);
    assert!(!replica.reader().contains_key(&"p2".into()).await?);
    Ok(())
}

#[tokio::test]
async fn test_reader_side_refuses_writes() -> Result<()> {
    let (_dir, connection_string, _) = on_disk().await?;
    let replica = open(&connection_string).await?;
    replica.writer().try_add(&"p1".into(), &Person::new("Alice", 30), false).await?;

    let err = replica.reader().try_add(&"p2".into(), &Person::new("Eve", 1), false).await.unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)), "{:?}", err);
    assert!(!replica.contains_key(&"p2".into()).await?);
    Ok(())
}

#[tokio::test]
async fn test_marker_in_connection_string_is_rejected() -> Result<()> {
    let (_dir, connection_string, _) = on_disk().await?;
    for marker in ["read_only=true", "read_only=1", "READ_ONLY=true", "read_only = true", "read_only=yes"] {
        let err = open(&format!("{};{}", connection_string, marker)).await.err().expect("marker rejected");
        assert!(matches!(err, StorageError::InvalidArgument(_)), "{}: {:?}", marker, err);
    }
    assert!(!SqliteDriver::has_read_only_marker(&format!("{};read_only=false", connection_string)));
    Ok(())
}

#[tokio::test]
async fn test_replica_from_existing_drivers() -> Result<()> {
    let (_dir, connection_string, storage) = on_disk().await?;
    let reader = Arc::new(SqliteDriver::open(&format!("{};read_only=true", connection_string)).await?);
    let replica = ReadReplica::from_drivers(storage.driver().clone(), reader, &TableOptions::new("settings"), |driver, options| {
        SqlMap::new(driver, options, string_key("Key"), string_value("Value"), storage.types().clone())
    })?;
    replica.try_add(&"theme".to_string(), &"dark".to_string(), false).await?;
    assert_eq!(replica.get(&"theme".to_string()).await?, Some("dark".to_string()));
    Ok(())
}
