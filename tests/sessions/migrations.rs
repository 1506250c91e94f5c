//! Migration Tests
//!
//! Records written by older versions are upgraded on load and replay.

use crate::common::*;
use serde_json::{json, Value};
use std::time::Duration;
use strata_session::prelude::*;
use strata_session::{Migration, StoredRecord};

#[tokio::test]
async fn pre_migration_record_gains_coins() {
    let t = TestDb::new();
    let store = t.players();
    let key = unique_key();
    t.backend
        .seed(&store.key(&key), StoredRecord::new(json!({"items": ["sword"]}), ""));

    let session = store.load(&key);
    session.wait().await.unwrap();
    assert_eq!(session.value().coins, 0);
    assert_eq!(session.value().items, vec!["sword".to_string()]);

    // Written back at the latest step
    let earn = earn(&store);
    session.patch(&earn, 1).unwrap();
    session.save().await.unwrap();
    let remote = t.backend.peek(&store.key(&key)).unwrap();
    assert_eq!(remote.record.step, "v1");
    assert_eq!(remote.record.value["coins"], json!(1));
}

#[tokio::test]
async fn latest_step_record_is_not_migrated_again() {
    let t = TestDb::new();
    let doubled = t
        .db
        .store(
            StoreConfig::new("scores", || 0i64)
                .migration("double", |v: Value| json!(v.as_i64().unwrap_or(0) * 2))
                .autosave_delay(Duration::from_secs(3600)),
        )
        .unwrap();
    let key = unique_key();
    t.backend
        .seed(&doubled.key(&key), StoredRecord::new(json!(21), "double"));

    let session = doubled.load(&key);
    session.wait().await.unwrap();
    assert_eq!(session.value(), 21);
}

#[tokio::test]
async fn partial_migration_applies_remaining_steps() {
    let t = TestDb::new();
    let store = t
        .db
        .store(
            StoreConfig::new("scores", || 0i64)
                .migrations([
                    Migration::new("double", |v: Value| json!(v.as_i64().unwrap_or(0) * 2)),
                    Migration::new("inc", |v: Value| json!(v.as_i64().unwrap_or(0) + 1)),
                ])
                .autosave_delay(Duration::from_secs(3600)),
        )
        .unwrap();
    assert_eq!(store.latest_step(), "inc");

    let from_start = unique_key();
    let from_double = unique_key();
    t.backend
        .seed(&store.key(&from_start), StoredRecord::new(json!(5), ""));
    t.backend
        .seed(&store.key(&from_double), StoredRecord::new(json!(5), "double"));

    let a = store.load(&from_start);
    let b = store.load(&from_double);
    a.wait().await.unwrap();
    b.wait().await.unwrap();
    assert_eq!(a.value(), 11);
    assert_eq!(b.value(), 6);
}

#[tokio::test]
async fn replay_migrates_remote_written_by_older_version() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();

    // An older client writes a record without coins
    t.backend
        .seed(&store.key(&key), StoredRecord::new(json!({"items": ["shield"]}), ""));

    session.patch(&earn, 2).unwrap();
    session.save().await.unwrap();

    assert_eq!(session.value().coins, 2);
    assert_eq!(session.value().items, vec!["shield".to_string()]);
    let remote = t.backend.peek(&store.key(&key)).unwrap();
    assert_eq!(remote.record.step, "v1");
}
