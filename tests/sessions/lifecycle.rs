//! Session Lifecycle Tests
//!
//! Loading, patching, stopping and the background autosave loop.

use crate::common::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use strata_session::prelude::*;
use strata_session::StoredRecord;

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn load_returns_immediately_and_settles() {
    let t = TestDb::new();
    let store = t.players();

    let session = store.load(unique_key());
    assert_eq!(session.status(), SessionStatus::Loading);
    assert!(!session.loaded());

    session.wait().await.unwrap();
    assert!(session.loaded());
    assert_eq!(session.value(), Player::default());
}

#[tokio::test]
async fn load_reads_existing_record() {
    let t = TestDb::new();
    let store = t.players();
    let key = unique_key();
    t.backend.seed(
        &store.key(&key),
        StoredRecord::new(json!({"coins": 9, "items": ["hat"]}), "v1"),
    );

    let session = store.load(&key);
    session.wait().await.unwrap();
    assert_eq!(session.value().coins, 9);
    assert_eq!(session.value().items, vec!["hat".to_string()]);
    assert!(session.synced_token().is_some());
}

#[tokio::test]
async fn load_retries_transient_backend_failures() {
    let t = TestDb::new();
    let store = t.players();
    t.backend.fail_next_reads(3);

    let session = store.load(unique_key());
    session.wait().await.unwrap();
    assert!(session.loaded());
}

#[tokio::test]
async fn failed_load_is_retried_by_autosave() {
    let t = TestDb::new();
    let store = t
        .db
        .store(
            StoreConfig::new("players", Player::default)
                .autosave_delay(Duration::from_millis(10))
                .retry(RetryConfig::no_retry()),
        )
        .unwrap();
    t.backend.fail_next_reads(1);

    let session = store.load(unique_key());
    let err = session.wait().await.unwrap_err();
    assert!(Error::from(err).is_retryable());
    assert_eq!(session.status(), SessionStatus::Loading);

    assert!(eventually(|| session.loaded()).await);
}

// ============================================================================
// Patching
// ============================================================================

#[tokio::test]
async fn patch_is_synchronous_and_notifies() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let session = store.load(unique_key());
    session.wait().await.unwrap();
    let fired = count_updates(&session);

    session.patch(&earn, 4).unwrap();
    session.patch(&earn, 6).unwrap();

    assert_eq!(session.value().coins, 10);
    assert_eq!(session.pending_actions(), 2);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn listeners_see_changes_in_order() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let session = store.load(unique_key());
    session.wait().await.unwrap();

    let seen = std::sync::Arc::new(Seen::default());
    let sink = seen.clone();
    session.updated(move |p: &Player| sink.push(p.coins));

    for n in 1..=5 {
        session.patch(&earn, n).unwrap();
    }
    assert_eq!(seen.take(), vec![1, 3, 6, 10, 15]);
}

#[tokio::test]
async fn listener_may_patch_its_own_session() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let session = store.load(unique_key());
    session.wait().await.unwrap();

    let handle = session.clone();
    let bonus = earn.clone();
    session.updated(move |p: &Player| {
        if p.coins == 1 {
            handle.patch(&bonus, 100).unwrap();
        }
    });

    session.patch(&earn, 1).unwrap();
    assert_eq!(session.value().coins, 101);
    assert_eq!(session.pending_actions(), 2);
}

// ============================================================================
// Saving and stopping
// ============================================================================

#[tokio::test]
async fn save_writes_latest_step_and_user_ids() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load_with_users(&key, [7, 3]);
    session.wait().await.unwrap();

    session.patch(&earn, 2).unwrap();
    session.save().await.unwrap();

    let remote = t.backend.peek(&store.key(&key)).unwrap();
    assert_eq!(remote.record.step, "v1");
    assert_eq!(remote.record.user_ids.into_iter().collect::<Vec<_>>(), vec![3, 7]);
    assert_eq!(remote.record.value["coins"], json!(2));
}

#[tokio::test]
async fn save_with_empty_log_does_not_write() {
    let t = TestDb::new();
    let store = t.players();
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();

    session.save().await.unwrap();
    assert_eq!(t.backend.stats().writes, 0);
    assert!(t.stored(&store, &key).is_none());
}

#[tokio::test]
async fn stop_flushes_pending_actions() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();

    session.patch(&earn, 5).unwrap();
    session.stop();
    let err = session.patch(&earn, 1).unwrap_err();
    assert!(matches!(Error::from(err), Error::Unavailable(_)));

    session.wait().await.unwrap();
    assert_eq!(t.stored(&store, &key).unwrap()["coins"], json!(5));
    assert_eq!(session.status(), SessionStatus::Stopped);
}

#[tokio::test]
async fn stop_waits_for_in_flight_save() {
    let t = TestDb::new();
    let store = t.players();
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();

    t.backend.conflict_next_writes(5);
    session.patch(&earn, 1).unwrap();
    let saving = session.clone();
    let save = tokio::spawn(async move { saving.save().await });
    while t.backend.stats().conflicts == 0 {
        tokio::task::yield_now().await;
    }

    session.patch(&earn, 2).unwrap();
    session.stop();
    session.wait().await.unwrap();
    save.await.unwrap().unwrap();

    assert_eq!(session.status(), SessionStatus::Stopped);
    assert_eq!(session.pending_actions(), 0);
    assert_eq!(t.backend.stats().conflicts, 5);
    assert_eq!(t.stored(&store, &key).unwrap()["coins"], json!(3));
}

#[tokio::test]
async fn stop_while_loading_discards_load() {
    let t = TestDb::new();
    let store = t.players();
    let session = store.load(unique_key());

    session.stop();
    session.wait().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert!(!session.loaded());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let t = TestDb::new();
    let store = t.players();
    let session = store.load(unique_key());
    session.wait().await.unwrap();

    session.stop();
    session.stop();
    session.wait().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Stopped);
}

// ============================================================================
// Autosave
// ============================================================================

#[tokio::test]
async fn autosave_flushes_in_background() {
    let t = TestDb::new();
    let store = players(&t.db, Duration::from_millis(10));
    let earn = earn(&store);
    let key = unique_key();
    let session = store.load(&key);
    session.wait().await.unwrap();

    session.patch(&earn, 3).unwrap();
    assert!(eventually(|| t.stored(&store, &key).is_some()).await);
    assert_eq!(t.stored(&store, &key).unwrap()["coins"], json!(3));
    assert!(eventually(|| session.pending_actions() == 0).await);
}

#[tokio::test]
async fn autosave_pulls_remote_changes_when_idle() {
    let t = TestDb::new();
    let store = players(&t.db, Duration::from_millis(10));
    let key = unique_key();
    let idle = store.load(&key);
    idle.wait().await.unwrap();
    let fired = count_updates(&idle);

    let other = t.other_process();
    let other_store = players(&other, Duration::from_secs(3600));
    let earn = earn(&other_store);
    let writer = other_store.load(&key);
    writer.wait().await.unwrap();
    writer.patch(&earn, 12).unwrap();
    writer.save().await.unwrap();

    assert!(eventually(|| idle.value().coins == 12).await);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Ordered record of listener output
#[derive(Default)]
struct Seen(std::sync::Mutex<Vec<i64>>);

impl Seen {
    fn push(&self, coins: i64) {
        self.0.lock().unwrap().push(coins);
    }

    fn take(&self) -> Vec<i64> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}
