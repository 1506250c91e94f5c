//! Transaction context
//!
//! A [`Transaction`] collects transactional actions queued against one or
//! more sessions. Nothing is applied while queueing; the coordinator applies
//! the whole batch at commit time or nothing at all.
//!
//! Sessions take part through the [`Participant`] seam. The transaction only
//! borrows its participants for its own lifetime, it never owns them.

use crate::log::PendingAction;
use crate::registry::{Action, ActionRegistry};
use async_trait::async_trait;
use serde::Serialize;
use strata_core::error::{Result, StrataError};
use strata_core::traits::Data;
use strata_core::types::SessionId;

/// Unique identifier of a transaction within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Transaction lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Collecting actions
    Pending,
    /// Every queued action was applied
    Committed,
    /// Nothing was applied
    Aborted {
        /// Why the transaction aborted
        reason: String,
    },
}

/// A session that can take part in a transaction
///
/// # Commit protocol
///
/// ```text
/// 1. ready()    - wait for the participant to finish loading
/// 2. stage()    - lock out other writers, re-run actions on the live value
/// 3. apply()    - publish the staged value and log entries (all participants)
/// 4. unlock()   - release every lock (all participants)
/// 5. notify()   - fire change callbacks, with no participant locked
/// ```
///
/// A failing `stage()` aborts the transaction; dropping the staged commits
/// of the other participants releases them without mutation.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Stable identity, also the lock order
    fn participant_id(&self) -> SessionId;

    /// Human-readable label for logs
    fn label(&self) -> String;

    /// Fail early if the participant can no longer accept actions
    fn check_open(&self) -> Result<()>;

    /// Wait until the initial load has finished (successfully or not)
    async fn ready(&self);

    /// Re-run `actions` in order against the live value and hold the result
    fn stage<'a>(&'a self, actions: Vec<PendingAction>, strict: bool)
        -> Result<Box<dyn StagedCommit + 'a>>;
}

/// A validated, not yet visible, per-participant commit
pub trait StagedCommit {
    /// Publish the staged value and append the log entries
    fn apply(&mut self);

    /// Release the participant after every participant has applied
    fn unlock(&mut self);

    /// Notify listeners; runs once every participant is unlocked
    fn notify(self: Box<Self>);
}

/// Participants that can resolve typed action handles
pub trait ActionSource<T: Data> {
    /// Registry of the participant's store
    fn registry(&self) -> &ActionRegistry<T>;
}

/// A pending multi-session transaction
pub struct Transaction<'a> {
    id: TransactionId,
    queued: Vec<(&'a dyn Participant, PendingAction)>,
    status: TransactionStatus,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            queued: Vec::new(),
            status: TransactionStatus::Pending,
        }
    }

    /// Transaction id
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Number of queued actions
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Whether nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Queue a transactional action against a session
    ///
    /// The action is not applied until commit. Normal actions are refused:
    /// they apply immediately and cannot be deferred.
    pub fn queue<T, P, S>(&mut self, session: &'a S, action: &Action<T, P>, params: P) -> Result<()>
    where
        T: Data,
        P: Serialize,
        S: Participant + ActionSource<T>,
    {
        if self.status != TransactionStatus::Pending {
            return Err(StrataError::InvalidOperation(format!(
                "{} is no longer pending",
                self.id
            )));
        }
        if !action.is_transactional() {
            return Err(StrataError::InvalidOperation(format!(
                "{} is not a transactional action",
                action.key()
            )));
        }
        session.check_open()?;
        let pending = session.registry().prepare(action, &params)?;
        self.queued.push((session as &dyn Participant, pending));
        Ok(())
    }

    pub(crate) fn take_queued(&mut self) -> Vec<(&'a dyn Participant, PendingAction)> {
        std::mem::take(&mut self.queued)
    }

    pub(crate) fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("queued", &self.queued.len())
            .field("status", &self.status)
            .finish()
    }
}
