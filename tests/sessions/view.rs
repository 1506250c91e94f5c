//! View Tests
//!
//! Read-only historical access by token and by time.

use crate::common::*;
use serde_json::json;
use std::time::Duration;
use strata_session::prelude::*;
use strata_session::{StoredRecord, Timestamp};

#[tokio::test]
async fn latest_of_missing_key_is_none() {
    let t = TestDb::new();
    let store = t.players();
    let view = store.view(unique_key());
    assert_eq!(view.latest().await.unwrap(), None);
}

#[tokio::test]
async fn version_reads_each_written_revision() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();

    session.patch(&earn, 1).unwrap();
    session.save().await.unwrap();
    let first = session.synced_token().unwrap();

    session.patch(&earn, 1).unwrap();
    session.save().await.unwrap();
    let second = session.synced_token().unwrap();

    let view = store.view(&key);
    assert_eq!(view.version(&first).await.unwrap().unwrap().coins, 1);
    assert_eq!(view.version(&second).await.unwrap().unwrap().coins, 2);
    assert_eq!(view.latest().await.unwrap().unwrap().coins, 2);
    assert_eq!(view.version(&VersionToken::new("nope")).await.unwrap(), None);
}

#[tokio::test]
async fn timestamp_reads_value_current_at_time() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();
    session.patch(&earn, 7).unwrap();
    session.save().await.unwrap();

    let view = store.view(&key);
    let later = Timestamp::now().as_unix_secs() + 60;
    assert_eq!(view.timestamp(later).await.unwrap().unwrap().coins, 7);
    assert_eq!(view.timestamp(0).await.unwrap(), None);
}

#[tokio::test]
async fn view_migrates_but_skips_schema() {
    let t = TestDb::new();
    let store = t
        .db
        .store(
            StoreConfig::new("players", Player::default)
                .migration("v1", add_coins)
                .schema(|_| false)
                .autosave_delay(Duration::from_secs(3600)),
        )
        .unwrap();
    let key = unique_key();
    t.backend
        .seed(&store.key(&key), StoredRecord::new(json!({"items": []}), ""));

    let value = store.view(&key).latest().await.unwrap().unwrap();
    assert_eq!(value, Player::default());

    // A session over the same record is quarantined
    let session = store.load(&key);
    assert!(session.wait().await.is_err());
    assert_eq!(session.bad(), Some(BadReason::SchemaMismatch));
}

#[tokio::test]
async fn view_never_mutates_sessions() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();
    session.patch(&earn, 5).unwrap();

    assert_eq!(store.view(&key).latest().await.unwrap(), None);
    assert_eq!(session.value().coins, 5);
    assert_eq!(session.pending_actions(), 1);
}
