//! Sessions
//!
//! A [`Session`] is the exclusive, in-memory owner of one record. It holds
//! the current value and the log of actions applied since the last confirmed
//! write, and keeps both in step with the backend in the background.
//!
//! ## State machine
//!
//! ```text
//!            load ok                 stop
//! Loading ───────────► Loaded ──────────────► Stopped
//!    │                   │                       ▲
//!    │ bad data          │ bad data              │ stop
//!    └─────────► bad ◄───┘ ──────────────────────┘
//! ```
//!
//! ## Locking
//!
//! - `gate`: serializes mutation of one session. Actions run under it.
//! - `state`: protects value, log and status. Never held while user code
//!   runs.
//! - `outbox`: changes waiting to be delivered to listeners, queued under
//!   `state` in the order they happened.
//! - `write_gate`: async mutex; one read/write protocol at a time.
//!
//! Lock order is `gate`, then `state`, then `outbox`. Listeners run with no
//! lock held, so a listener may patch any session. Neither parking_lot lock
//! is held across an await point.

use crate::store::StoreInner;
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use strata_concurrency::{
    Action, ActionLog, ActionRegistry, ActionSource, Participant, PendingAction, StagedCommit,
};
use strata_core::error::{Result, StrataError};
use strata_core::traits::Data;
use strata_core::types::{BadReason, RecordKey, SessionId, VersionToken, WriteId};
use tokio::sync::{watch, Notify};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Initial read still pending
    Loading,
    /// Value available; patches accepted
    Loaded,
    /// Terminal; no further patches
    Stopped,
}

pub(crate) struct SessionState<T> {
    pub(crate) status: SessionStatus,
    pub(crate) bad: Option<BadReason>,
    pub(crate) value: T,
    pub(crate) log: ActionLog,
    pub(crate) synced_token: Option<VersionToken>,
    pub(crate) in_doubt: Option<InDoubtWrite>,
}

/// A write whose outcome is unknown because the backend reported an error
#[derive(Debug, Clone)]
pub(crate) struct InDoubtWrite {
    pub(crate) id: WriteId,
    pub(crate) written: usize,
}

/// Changes not yet delivered to listeners
struct Outbox<T> {
    queue: VecDeque<T>,
    draining: bool,
}

/// Background operation bookkeeping, observed by `wait()`
#[derive(Debug, Clone, Default)]
pub(crate) struct OpStatus {
    pub(crate) in_flight: usize,
    pub(crate) last: Option<Result<()>>,
}

pub(crate) struct SessionInner<T> {
    pub(crate) id: SessionId,
    pub(crate) key: RecordKey,
    pub(crate) store: Arc<StoreInner<T>>,
    pub(crate) user_ids: BTreeSet<u64>,
    pub(crate) gate: ReentrantMutex<()>,
    pub(crate) state: Mutex<SessionState<T>>,
    listeners: Mutex<Vec<Listener<T>>>,
    outbox: Mutex<Outbox<T>>,
    pub(crate) write_gate: tokio::sync::Mutex<()>,
    ops: watch::Sender<OpStatus>,
    settled: watch::Sender<bool>,
    pub(crate) shutdown: Arc<Notify>,
}

impl<T: Data> SessionInner<T> {
    /// Clone of the value, if the session accepts patches
    pub(crate) fn snapshot_open(&self) -> Result<T> {
        let state = self.state.lock();
        if let Some(reason) = state.bad {
            return Err(StrataError::quarantined(&self.key, reason));
        }
        match state.status {
            SessionStatus::Loaded => Ok(state.value.clone()),
            SessionStatus::Loading => Err(StrataError::NotLoaded {
                key: self.key.to_string(),
            }),
            SessionStatus::Stopped => Err(StrataError::Stopped {
                key: self.key.to_string(),
            }),
        }
    }

    pub(crate) fn check_not_bad(&self) -> Result<()> {
        match self.state.lock().bad {
            Some(reason) => Err(StrataError::quarantined(&self.key, reason)),
            None => Ok(()),
        }
    }

    /// Mark the session bad; the caller holds the gate
    pub(crate) fn quarantine(&self, state: &mut SessionState<T>, reason: BadReason) -> StrataError {
        if state.bad.is_none() {
            state.bad = Some(reason);
            tracing::warn!(key = %self.key, reason = %reason, "session quarantined");
        }
        self.settle();
        StrataError::quarantined(&self.key, reason)
    }

    /// Queue a change for the listeners; the caller holds `state`
    pub(crate) fn publish(&self, value: T) {
        self.outbox.lock().queue.push_back(value);
    }

    /// Deliver queued changes in order; the caller holds no session lock
    ///
    /// If another caller is already delivering, it also delivers what this
    /// caller queued.
    pub(crate) fn deliver(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        loop {
            let next = {
                let mut outbox = self.outbox.lock();
                match outbox.queue.pop_front() {
                    Some(value) => value,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            let listeners = self.listeners.lock().clone();
            for listener in listeners {
                listener(&next);
            }
        }
    }

    /// Wake transactions waiting for the initial load
    pub(crate) fn settle(&self) {
        self.settled.send_replace(true);
    }

    pub(crate) fn begin_op(&self) {
        self.ops.send_modify(|ops| ops.in_flight += 1);
    }

    pub(crate) fn end_op(&self, result: Result<()>) {
        self.ops.send_modify(|ops| {
            ops.in_flight = ops.in_flight.saturating_sub(1);
            ops.last = Some(result);
        });
    }
}

/// Exclusive in-memory owner of one record
///
/// Cloning yields another handle to the same session.
pub struct Session<T> {
    pub(crate) inner: Arc<SessionInner<T>>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Data> Session<T> {
    pub(crate) fn new(store: Arc<StoreInner<T>>, key: RecordKey, user_ids: BTreeSet<u64>) -> Self {
        let value = (store.default_data)();
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::next(),
                key,
                store,
                user_ids,
                gate: ReentrantMutex::new(()),
                state: Mutex::new(SessionState {
                    status: SessionStatus::Loading,
                    bad: None,
                    value,
                    log: ActionLog::new(),
                    synced_token: None,
                    in_doubt: None,
                }),
                listeners: Mutex::new(Vec::new()),
                outbox: Mutex::new(Outbox {
                    queue: VecDeque::new(),
                    draining: false,
                }),
                write_gate: tokio::sync::Mutex::new(()),
                ops: watch::channel(OpStatus::default()).0,
                settled: watch::channel(false).0,
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    /// Process-local session id
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Record key
    pub fn key(&self) -> &RecordKey {
        &self.inner.key
    }

    /// Clone of the current value
    pub fn value(&self) -> T {
        self.inner.state.lock().value.clone()
    }

    /// Current lifecycle state
    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    /// Whether the initial load completed
    pub fn loaded(&self) -> bool {
        self.status() == SessionStatus::Loaded
    }

    /// Quarantine cause, if the session's data is bad
    pub fn bad(&self) -> Option<BadReason> {
        self.inner.state.lock().bad
    }

    /// Number of actions not yet confirmed by a write
    pub fn pending_actions(&self) -> usize {
        self.inner.state.lock().log.len()
    }

    /// Token of the last record this session synced with
    pub fn synced_token(&self) -> Option<VersionToken> {
        self.inner.state.lock().synced_token.clone()
    }

    /// Register a callback fired synchronously on every value change
    pub fn updated<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(callback));
    }

    /// Apply a normal action to the value and append it to the log
    ///
    /// Synchronous; never touches the backend. A rejection leaves the
    /// session unchanged.
    pub fn patch<P: Serialize>(&self, action: &Action<T, P>, params: P) -> Result<()> {
        if action.is_transactional() {
            return Err(StrataError::InvalidOperation(format!(
                "{} can only run inside a transaction",
                action.key()
            )));
        }

        let inner = &*self.inner;
        let registry = &inner.store.registry;
        {
            let _gate = inner.gate.lock();
            let current = inner.snapshot_open()?;
            let pending = registry.prepare(action, &params)?;
            let next = registry.invoke(
                &pending.action,
                &current,
                &pending.params,
                inner.store.strict.enabled(),
            )?;

            let mut state = inner.state.lock();
            state.log.push(pending);
            if next != current {
                state.value = next.clone();
                inner.publish(next);
            }
        }
        inner.deliver();
        Ok(())
    }

    /// Suspend until no read or write is in flight
    ///
    /// Returns the outcome of the most recent background operation.
    pub async fn wait(&self) -> Result<()> {
        let mut ops = self.inner.ops.subscribe();
        let last = match ops.wait_for(|status| status.in_flight == 0).await {
            Ok(status) => status.last.clone(),
            Err(_) => None,
        };
        last.unwrap_or(Ok(()))
    }

    /// Run the write protocol now
    pub async fn save(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        inner.begin_op();
        let task = Arc::clone(&inner);
        let handle = inner.store.runtime.spawn(async move {
            let result = task.flush().await;
            task.end_op(result.clone());
            result
        });
        handle
            .await
            .map_err(|e| StrataError::InvalidOperation(format!("save task failed: {}", e)))?
    }

    /// Stop the session
    ///
    /// Refuses further patches immediately, cancels autosave and starts one
    /// final flush whose outcome is reported through [`Session::wait`].
    pub fn stop(&self) {
        let inner = &self.inner;
        let flush = {
            let _gate = inner.gate.lock();
            let mut state = inner.state.lock();
            if state.status == SessionStatus::Stopped {
                return;
            }
            let was_loaded = state.status == SessionStatus::Loaded;
            state.status = SessionStatus::Stopped;
            was_loaded && state.bad.is_none() && !state.log.is_empty()
        };
        inner.settle();
        inner.shutdown.notify_one();
        tracing::debug!(key = %inner.key, "session stopped");

        if flush {
            inner.begin_op();
            let task = Arc::clone(inner);
            inner.store.runtime.spawn(async move {
                let result = task.flush().await;
                task.end_op(result);
            });
        }
    }

    /// Spawn the initial load followed by the autosave loop
    pub(crate) fn start(&self) {
        self.inner.begin_op();
        let task = Arc::clone(&self.inner);
        self.inner.store.runtime.spawn(async move {
            let result = task.load_with_retry().await;
            task.end_op(result);
            let weak = Arc::downgrade(&task);
            let shutdown = Arc::clone(&task.shutdown);
            let delay = task.store.autosave_delay;
            drop(task);
            crate::sync::autosave(weak, shutdown, delay).await;
        });
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .finish()
    }
}

/// A session's validated, unpublished part of a transaction
struct StagedSession<'a, T> {
    inner: &'a SessionInner<T>,
    gate: Option<ReentrantMutexGuard<'a, ()>>,
    state: Option<MutexGuard<'a, SessionState<T>>>,
    actions: Vec<PendingAction>,
    next: T,
    changed: bool,
}

impl<T: Data> StagedCommit for StagedSession<'_, T> {
    fn apply(&mut self) {
        let mut state = self.inner.state.lock();
        for action in self.actions.drain(..) {
            state.log.push(action);
        }
        if self.changed {
            state.value = self.next.clone();
            self.inner.publish(self.next.clone());
        }
        self.state = Some(state);
    }

    fn unlock(&mut self) {
        self.state.take();
        self.gate.take();
    }

    fn notify(self: Box<Self>) {
        self.inner.deliver();
    }
}

#[async_trait::async_trait]
impl<T: Data> Participant for Session<T> {
    fn participant_id(&self) -> SessionId {
        self.inner.id
    }

    fn label(&self) -> String {
        self.inner.key.to_string()
    }

    fn check_open(&self) -> Result<()> {
        let state = self.inner.state.lock();
        if let Some(reason) = state.bad {
            return Err(StrataError::quarantined(&self.inner.key, reason));
        }
        if state.status == SessionStatus::Stopped {
            return Err(StrataError::Stopped {
                key: self.inner.key.to_string(),
            });
        }
        Ok(())
    }

    async fn ready(&self) {
        let mut settled = self.inner.settled.subscribe();
        let mut ops = self.inner.ops.subscribe();
        // A failed load leaves the session Loading; staging then refuses it
        tokio::select! {
            _ = settled.wait_for(|settled| *settled) => {}
            _ = ops.wait_for(|ops| ops.in_flight == 0) => {}
        }
    }

    fn stage<'a>(
        &'a self,
        actions: Vec<PendingAction>,
        strict: bool,
    ) -> Result<Box<dyn StagedCommit + 'a>> {
        let inner = &*self.inner;
        let gate = inner.gate.lock();
        let current = inner.snapshot_open()?;
        let mut next = current.clone();
        for action in &actions {
            next = inner
                .store
                .registry
                .invoke(&action.action, &next, &action.params, strict)?;
        }
        let changed = next != current;
        Ok(Box::new(StagedSession {
            inner,
            gate: Some(gate),
            state: None,
            actions,
            next,
            changed,
        }))
    }
}

impl<T: Data> ActionSource<T> for Session<T> {
    fn registry(&self) -> &ActionRegistry<T> {
        &self.inner.store.registry
    }
}
