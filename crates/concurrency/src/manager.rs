//! Transaction coordinator
//!
//! Provides all-or-nothing commit across sessions by orchestrating:
//! 1. Readiness (participants finish loading)
//! 2. Validation (re-run every queued action against the live value)
//! 3. Publication (apply to every participant, then notify)
//!
//! Core invariants:
//! - All-or-nothing: either every participant sees the change or none does
//! - Queued order: actions against one participant apply in queued order
//! - Last-validated-wins: validation happens under the participants' writer
//!   locks, immediately before publication
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Group queued actions by participant (lock order = participant id)
//! 2. Await ready() on every participant
//! 3. stage() each participant in id order
//! 4. IF any stage fails: drop staged commits, abort, return error
//! 5. apply() every staged commit
//! 6. unlock() every staged commit
//! 7. notify() every staged commit
//! ```
//!
//! There is no global lock: two transactions touching disjoint sessions
//! commit independently, and overlapping ones serialize on the shared
//! participants' writer locks, acquired in id order.

use crate::log::PendingAction;
use crate::transaction::{Participant, Transaction, TransactionId, TransactionStatus};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::error::{Result, StrataError};
use strata_core::types::SessionId;

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionMetrics {
    /// Total committed transactions
    pub total_committed: u64,
    /// Total aborted transactions
    pub total_aborted: u64,
}

/// Coordinates commits of multi-session transactions
#[derive(Debug)]
pub struct TransactionCoordinator {
    /// Next transaction ID
    next_txn_id: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a new coordinator
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    /// Start a new pending transaction
    pub fn begin<'a>(&self) -> Transaction<'a> {
        Transaction::new(TransactionId(self.next_txn_id.fetch_add(1, Ordering::SeqCst)))
    }

    /// Run `success` to queue actions, then commit
    ///
    /// Any error returned by `success` aborts the transaction before commit.
    pub async fn run<'a, S>(&self, strict: bool, success: S) -> Result<TransactionId>
    where
        S: FnOnce(&mut Transaction<'a>) -> Result<()>,
    {
        let mut txn = self.begin();
        if let Err(e) = success(&mut txn) {
            self.abort(&mut txn, e.to_string());
            return Err(StrataError::TransactionAborted {
                reason: e.to_string(),
            });
        }
        self.commit(&mut txn, strict).await?;
        Ok(txn.id())
    }

    /// Commit a transaction atomically
    ///
    /// # Returns
    /// - Ok(()) once every queued action is visible on every participant
    /// - Err(TransactionAborted) if any action failed to validate; no
    ///   participant was mutated
    pub async fn commit(&self, txn: &mut Transaction<'_>, strict: bool) -> Result<()> {
        if *txn.status() != TransactionStatus::Pending {
            return Err(StrataError::InvalidOperation(format!(
                "{} is not pending",
                txn.id()
            )));
        }

        let mut groups: BTreeMap<SessionId, (&dyn Participant, Vec<PendingAction>)> =
            BTreeMap::new();
        for (participant, action) in txn.take_queued() {
            groups
                .entry(participant.participant_id())
                .or_insert_with(|| (participant, Vec::new()))
                .1
                .push(action);
        }

        for (participant, _) in groups.values() {
            participant.ready().await;
        }

        let mut staged = Vec::with_capacity(groups.len());
        for (participant, actions) in groups.into_values() {
            match participant.stage(actions, strict) {
                Ok(commit) => staged.push(commit),
                Err(e) => {
                    // Releases every participant staged so far, untouched
                    drop(staged);
                    let reason = format!("{}: {}", participant.label(), e);
                    self.abort(txn, reason.clone());
                    return Err(StrataError::TransactionAborted { reason });
                }
            }
        }

        for commit in staged.iter_mut() {
            commit.apply();
        }
        for commit in staged.iter_mut() {
            commit.unlock();
        }
        for commit in staged {
            commit.notify();
        }

        txn.set_status(TransactionStatus::Committed);
        self.committed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(txn = %txn.id(), "transaction committed");
        Ok(())
    }

    /// Explicitly abort a transaction
    ///
    /// All queued actions are discarded.
    pub fn abort(&self, txn: &mut Transaction<'_>, reason: String) {
        txn.take_queued();
        tracing::debug!(txn = %txn.id(), reason = %reason, "transaction aborted");
        txn.set_status(TransactionStatus::Aborted { reason });
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Commit and abort counters
    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            total_committed: self.committed.load(Ordering::Relaxed),
            total_aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
