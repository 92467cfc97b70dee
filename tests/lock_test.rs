mod helpers;

use std::sync::Arc;
use std::time::Duration;

use strata::lock::{LockError, SchemaView};
use strata::schema::manager::SchemaManager;
use strata::schema::ObjectKind;

use helpers::*;

#[tokio::test]
async fn readers_see_either_old_or_new_schema_never_a_mix() {
    let lock = lock_over(test_connector());
    let manager = Arc::new(SchemaManager::in_memory());
    let before = lock.read().await.schema().hash();

    let mut writer = lock.write().await;
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let lock = lock.clone();
            tokio::spawn(async move {
                let handle = lock.read().await;
                let schema = handle.schema();
                (schema.hash(), schema.find_class(ObjectKind::Thing, "Harbour").is_some())
            })
        })
        .collect();

    manager
        .add_class(&mut writer, ObjectKind::Thing, class("Harbour", vec![]))
        .unwrap();
    let after = writer.schema().hash();
    drop(writer);

    for reader in readers {
        let (hash, has_harbour) = reader.await.unwrap();
        // Readers were queued behind the writer, so they all see the update.
        assert_eq!(hash, after);
        assert!(has_harbour);
    }
    assert_ne!(before, after);
}

#[tokio::test]
async fn handles_release_on_drop() {
    let lock = lock_over(test_connector());

    let first = lock.read().await;
    let second = lock.try_read().expect("readers share the lock");
    assert!(lock.try_write().is_none());
    drop(first);
    drop(second);

    let writer = lock.try_write().expect("no holders left");
    assert!(lock.try_read().is_none());
    drop(writer);
    assert!(lock.try_read().is_some());
}

#[tokio::test]
async fn read_timeout_gives_up_while_writer_holds() {
    let lock = lock_over(test_connector());
    let writer = lock.write().await;

    let outcome = lock.read_timeout(Duration::from_millis(20)).await;
    assert!(matches!(outcome, Err(LockError::Timeout(_))));

    drop(writer);
    assert!(lock.read_timeout(Duration::from_millis(20)).await.is_ok());
}
