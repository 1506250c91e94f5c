//! Transaction Tests
//!
//! All-or-nothing application of transactional actions across sessions.

use crate::common::*;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_session::prelude::*;

struct Bank {
    t: TestDb,
    store: Store<Player>,
    withdraw: Action<Player, i64>,
    deposit: Action<Player, i64>,
}

impl Bank {
    fn new() -> Self {
        let t = TestDb::new();
        let store = t.players();
        let withdraw = store
            .transaction_action("withdraw", |mut p: Player, n: &i64| {
                if p.coins < *n {
                    return Err(Rejected::new("insufficient funds"));
                }
                p.coins -= n;
                Ok(p)
            })
            .unwrap();
        let deposit = store
            .transaction_action("deposit", |mut p: Player, n: &i64| {
                p.coins += n;
                Ok(p)
            })
            .unwrap();
        Self {
            t,
            store,
            withdraw,
            deposit,
        }
    }

    async fn account(&self, coins: i64) -> Session<Player> {
        let earn = earn(&self.store);
        let session = self.store.load(unique_key());
        session.wait().await.unwrap();
        session.patch(&earn, coins).unwrap();
        session
    }
}

// ============================================================================
// Commit
// ============================================================================

#[tokio::test]
async fn transfer_applies_to_both_sessions() {
    let bank = Bank::new();
    let alice = bank.account(10).await;
    let bob = bank.account(0).await;
    let alice_fired = count_updates(&alice);
    let bob_fired = count_updates(&bob);

    let committed = bank
        .t
        .db
        .transaction(|tx| {
            tx.queue(&alice, &bank.withdraw, 4)?;
            tx.queue(&bob, &bank.deposit, 4)?;
            Ok(())
        })
        .await;

    assert!(committed);
    assert_eq!(alice.value().coins, 6);
    assert_eq!(bob.value().coins, 4);
    assert_eq!(alice_fired.load(Ordering::SeqCst), 1);
    assert_eq!(bob_fired.load(Ordering::SeqCst), 1);
    assert_eq!(bank.t.db.metrics().transactions_committed, 1);
}

#[tokio::test]
async fn committed_actions_are_persisted_by_save() {
    let bank = Bank::new();
    let alice = bank.account(10).await;
    let bob = bank.account(0).await;

    assert!(
        bank.t
            .db
            .transaction(|tx| {
                tx.queue(&alice, &bank.withdraw, 10)?;
                tx.queue(&bob, &bank.deposit, 10)?;
                Ok(())
            })
            .await
    );

    alice.save().await.unwrap();
    bob.save().await.unwrap();
    assert_eq!(bank.t.stored(&bank.store, &alice.key().key).unwrap()["coins"], json!(0));
    assert_eq!(bank.t.stored(&bank.store, &bob.key().key).unwrap()["coins"], json!(10));
}

#[tokio::test]
async fn transaction_waits_for_loading_participants() {
    let bank = Bank::new();
    let alice = bank.account(5).await;
    let fresh = bank.store.load(unique_key());
    assert!(!fresh.loaded());

    let committed = bank
        .t
        .db
        .transaction(|tx| {
            tx.queue(&alice, &bank.withdraw, 5)?;
            tx.queue(&fresh, &bank.deposit, 5)?;
            Ok(())
        })
        .await;

    assert!(committed);
    assert_eq!(fresh.value().coins, 5);
}

#[tokio::test]
async fn several_actions_on_one_session_apply_in_order() {
    let bank = Bank::new();
    let alice = bank.account(3).await;

    // Deposit first, so the withdrawal validates against 3 + 7
    let committed = bank
        .t
        .db
        .transaction(|tx| {
            tx.queue(&alice, &bank.deposit, 7)?;
            tx.queue(&alice, &bank.withdraw, 10)?;
            Ok(())
        })
        .await;

    assert!(committed);
    assert_eq!(alice.value().coins, 0);
    assert_eq!(alice.pending_actions(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listener_may_patch_another_session_during_commits() {
    let bank = Bank::new();
    let first = bank.account(0).await;
    let alice = bank.account(1000).await;
    let bob = bank.account(0).await;
    let earn = earn(&bank.store);

    // Alice's listener patches a session that sorts before her
    let mirror = first.clone();
    alice.updated(move |_| mirror.patch(&earn, 1).unwrap());

    let rounds = 50;
    let transfers = {
        let (db, alice, bob) = (bank.t.db.clone(), alice.clone(), bob.clone());
        let (withdraw, deposit) = (bank.withdraw.clone(), bank.deposit.clone());
        tokio::spawn(async move {
            for _ in 0..rounds {
                assert!(
                    db.transaction(|tx| {
                        tx.queue(&alice, &withdraw, 1)?;
                        tx.queue(&bob, &deposit, 1)?;
                        Ok(())
                    })
                    .await
                );
            }
        })
    };
    let refunds = {
        let (db, first, alice) = (bank.t.db.clone(), first.clone(), alice.clone());
        let deposit = bank.deposit.clone();
        tokio::spawn(async move {
            for _ in 0..rounds {
                assert!(
                    db.transaction(|tx| {
                        tx.queue(&first, &deposit, 1)?;
                        tx.queue(&alice, &deposit, 1)?;
                        Ok(())
                    })
                    .await
                );
            }
        })
    };

    tokio::time::timeout(Duration::from_secs(20), async {
        transfers.await.unwrap();
        refunds.await.unwrap();
    })
    .await
    .expect("commits must not deadlock with listeners");

    assert_eq!(alice.value().coins, 1000);
    assert_eq!(bob.value().coins, rounds);
    // One deposit per refund plus one listener patch per change to alice
    assert_eq!(first.value().coins, 3 * rounds);
}

// ============================================================================
// Abort
// ============================================================================

#[tokio::test]
async fn failed_validation_changes_nothing() {
    let bank = Bank::new();
    let alice = bank.account(3).await;
    let bob = bank.account(0).await;
    let bob_fired = count_updates(&bob);
    let failed = Arc::new(AtomicBool::new(false));
    let flag = failed.clone();

    let committed = bank
        .t
        .db
        .transaction_with_failure(
            |tx| {
                tx.queue(&bob, &bank.deposit, 50)?;
                tx.queue(&alice, &bank.withdraw, 50)?;
                Ok(())
            },
            move |err| {
                assert!(matches!(err, Error::TransactionAborted(_)));
                flag.store(true, Ordering::SeqCst);
            },
        )
        .await;

    assert!(!committed);
    assert!(failed.load(Ordering::SeqCst));
    assert_eq!(alice.value().coins, 3);
    assert_eq!(bob.value().coins, 0);
    assert_eq!(alice.pending_actions(), 1);
    assert_eq!(bob.pending_actions(), 1);
    assert_eq!(bob_fired.load(Ordering::SeqCst), 0);
    assert_eq!(bank.t.db.metrics().transactions_aborted, 1);
}

#[tokio::test]
async fn normal_actions_cannot_be_queued() {
    let bank = Bank::new();
    let alice = bank.account(3).await;
    let earn = earn(&bank.store);

    let committed = bank
        .t
        .db
        .transaction(|tx| {
            tx.queue(&alice, &earn, 1)?;
            Ok(())
        })
        .await;

    assert!(!committed);
    assert_eq!(alice.value().coins, 3);
}

#[tokio::test]
async fn stopped_session_fails_the_transaction() {
    let bank = Bank::new();
    let alice = bank.account(3).await;
    let bob = bank.account(0).await;
    bob.stop();

    let committed = bank
        .t
        .db
        .transaction(|tx| {
            tx.queue(&alice, &bank.withdraw, 1)?;
            tx.queue(&bob, &bank.deposit, 1)?;
            Ok(())
        })
        .await;

    assert!(!committed);
    assert_eq!(alice.value().coins, 3);
}

#[tokio::test]
async fn session_whose_load_failed_fails_the_transaction() {
    let bank = Bank::new();
    let vault = bank
        .t
        .db
        .store(
            StoreConfig::new("vaults", Player::default)
                .autosave_delay(Duration::from_secs(3600))
                .retry(RetryConfig::no_retry()),
        )
        .unwrap();
    let grant = vault
        .transaction_action("grant", |mut p: Player, n: &i64| {
            p.coins += n;
            Ok(p)
        })
        .unwrap();

    bank.t.backend.fail_next_reads(1000);
    let session = vault.load(unique_key());
    assert!(session.wait().await.is_err());
    assert!(!session.loaded());

    let committed = tokio::time::timeout(
        Duration::from_secs(5),
        bank.t.db.transaction(|tx| tx.queue(&session, &grant, 1)),
    )
    .await
    .expect("transaction must not wait for a failed load");
    assert!(!committed);
    assert_eq!(bank.t.db.metrics().transactions_aborted, 1);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn duplicate_transactional_name_is_rejected() {
    let bank = Bank::new();
    let before = bank.store.transaction_action("deposit", |p: Player, _: &i64| Ok(p));
    assert!(matches!(
        before.map_err(Error::from),
        Err(Error::ConstraintViolation(_))
    ));

    // The original registration still works
    let bob = bank.account(0).await;
    assert!(
        bank.t
            .db
            .transaction(|tx| tx.queue(&bob, &bank.deposit, 2))
            .await
    );
    assert_eq!(bob.value().coins, 2);
}

#[tokio::test]
async fn same_name_in_different_stores_is_allowed() {
    let bank = Bank::new();
    let other = bank
        .t
        .db
        .store(StoreConfig::new("vaults", || 0i64))
        .unwrap();
    assert!(other
        .transaction_action("deposit", |v: i64, n: &i64| Ok(v + n))
        .is_ok());
}
