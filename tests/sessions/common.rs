//! Shared fixtures for session integration tests

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_session::prelude::*;
use strata_session::{Data, MemoryBackend};

/// Value type used across the suite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub coins: i64,
    #[serde(default)]
    pub items: Vec<String>,
}

/// One backend shared by any number of databases
///
/// Each database stands in for a separate process.
pub struct TestDb {
    pub backend: Arc<MemoryBackend>,
    pub db: Strata,
}

impl TestDb {
    /// Strict database with fast retries
    pub fn new() -> Self {
        init_tracing();
        let backend = Arc::new(MemoryBackend::new());
        let db = open(&backend, true);
        Self { backend, db }
    }

    /// Another database over the same backend
    pub fn other_process(&self) -> Strata {
        open(&self.backend, true)
    }

    /// `players` store that only syncs when asked
    pub fn players(&self) -> Store<Player> {
        players(&self.db, Duration::from_secs(3600))
    }

    /// Current stored JSON value of a key
    pub fn stored(&self, store: &Store<Player>, key: &str) -> Option<Value> {
        self.backend.peek(&store.key(key)).map(|r| r.record.value)
    }
}

pub fn open(backend: &Arc<MemoryBackend>, strict: bool) -> Strata {
    Strata::builder()
        .backend(backend.clone())
        .strict(strict)
        .retry(fast_retry())
        .open()
        .expect("open database")
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(20)
        .with_base_delay_ms(1)
        .with_max_delay_ms(5)
}

/// Adds `coins: 0` to records written before coins existed
pub fn add_coins(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.entry("coins").or_insert(json!(0));
    }
    value
}

pub fn players(db: &Strata, autosave: Duration) -> Store<Player> {
    db.store(
        StoreConfig::new("players", Player::default)
            .migration("v1", add_coins)
            .autosave_delay(autosave),
    )
    .expect("players store")
}

pub fn earn(store: &Store<Player>) -> Action<Player, i64> {
    store.action(|mut player: Player, n: &i64| {
        player.coins += n;
        Ok(player)
    })
}

pub fn spend(store: &Store<Player>) -> Action<Player, i64> {
    store.action(|mut player: Player, n: &i64| {
        if player.coins < *n {
            return Err(Rejected::new("not enough coins"));
        }
        player.coins -= n;
        Ok(player)
    })
}

/// Count `updated` notifications
pub fn count_updates<T: Data>(session: &Session<T>) -> Arc<AtomicUsize> {
    let fired = Arc::new(AtomicUsize::new(0));
    let hits = fired.clone();
    session.updated(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    fired
}

/// Unique key per call
pub fn unique_key() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!("key-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Poll `check` until it holds or about a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
