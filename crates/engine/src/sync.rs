//! Backend synchronization
//!
//! Loads, writes and pulls for one session. There is no lock on the
//! backend; sessions coordinate only through conditional writes.
//!
//! ## Write protocol
//!
//! ```text
//! 1. log empty                      -> done
//! 2. read remote record and token
//!    remote carries in-doubt id     -> confirm that write first
//! 3. token == synced token          -> write current value
//!    token != synced token          -> rebase: base = admit(remote),
//!                                      value = replay(log, base), notify
//! 4. write_if_unchanged(token)
//!    Written(t)                     -> drop written log prefix, synced = t
//!    Conflict                       -> back off, go to 2
//!    Err                            -> remember write id, back off, go to 2
//! 5. attempts exhausted             -> RetriesExhausted
//! ```
//!
//! Entries appended while a write is in flight stay in the log for the next
//! round.

use crate::session::{InDoubtWrite, SessionInner, SessionStatus};
use std::sync::{Arc, Weak};
use std::time::Duration;
use strata_concurrency::{replay, ReplayError};
use strata_core::error::{Result, StrataError};
use strata_core::traits::Data;
use strata_core::types::{BadReason, VersionToken, WriteId};
use strata_core::{RemoteRecord, StoredRecord, WriteOutcome};
use tokio::sync::Notify;

impl<T: Data> SessionInner<T> {
    /// Initial load, retrying backend failures with the store's policy
    ///
    /// When retries run out the session stays `Loading`; autosave keeps
    /// trying on every tick.
    pub(crate) async fn load_with_retry(&self) -> Result<()> {
        let retry = &self.store.retry;
        let mut last_error = None;
        for attempt in 0..retry.attempts() {
            if attempt > 0 {
                tokio::time::sleep(retry.delay_for(attempt - 1)).await;
                tracing::debug!(key = %self.key, attempt, "retrying load");
            }
            match self.load_once().await {
                Err(e) if e.is_retryable() => last_error = Some(e),
                other => return other,
            }
        }
        tracing::warn!(
            key = %self.key,
            attempts = retry.attempts(),
            "load failed, retrying on autosave"
        );
        Err(last_error.unwrap_or(StrataError::RetriesExhausted {
            key: self.key.to_string(),
            attempts: retry.attempts(),
        }))
    }

    async fn load_once(&self) -> Result<()> {
        let remote = self.store.backend.read(&self.key).await?;
        self.finish_load(remote)
    }

    fn finish_load(&self, remote: Option<RemoteRecord>) -> Result<()> {
        let loaded = self.finish_load_locked(remote);
        self.deliver();
        loaded
    }

    fn finish_load_locked(&self, remote: Option<RemoteRecord>) -> Result<()> {
        let _gate = self.gate.lock();
        {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Loading || state.bad.is_some() {
                return Ok(());
            }
            let (value, token) = match remote {
                None => ((self.store.default_data)(), None),
                Some(remote) => match self.store.monitor.admit(&self.key, remote.record) {
                    Ok(value) => (value, Some(remote.token)),
                    Err(reason) => return Err(self.quarantine(&mut state, reason)),
                },
            };
            state.value = value.clone();
            state.synced_token = token;
            state.status = SessionStatus::Loaded;
            self.publish(value);
        }
        self.settle();
        tracing::debug!(key = %self.key, "session loaded");
        Ok(())
    }

    /// Write the log to the backend
    pub(crate) async fn flush(&self) -> Result<()> {
        let _writer = self.write_gate.lock().await;
        self.check_not_bad()?;
        if self.log_len() == 0 {
            return Ok(());
        }

        let retry = self.store.retry.clone();
        for attempt in 0..retry.attempts() {
            if attempt > 0 {
                tokio::time::sleep(retry.delay_for(attempt - 1)).await;
                tracing::debug!(key = %self.key, attempt, "retrying write");
            }

            let remote = match self.store.backend.read(&self.key).await {
                Ok(remote) => remote,
                Err(e) => {
                    tracing::debug!(key = %self.key, attempt, error = %e, "read before write failed");
                    continue;
                }
            };
            self.resolve_in_doubt(remote.as_ref());
            let observed = remote.as_ref().map(|r| r.token.clone());

            let (record, written) = match self.rebase(remote)? {
                Some(prepared) => prepared,
                None => return Ok(()),
            };
            let write_id = WriteId::generate();
            let record = record.with_write_id(write_id.clone());

            match self
                .store
                .backend
                .write_if_unchanged(&self.key, record, observed.as_ref())
                .await
            {
                Ok(WriteOutcome::Written(token)) => {
                    self.confirm_write(written, token);
                    tracing::debug!(key = %self.key, written, "log flushed");
                    return Ok(());
                }
                Ok(WriteOutcome::Conflict) => {
                    tracing::debug!(key = %self.key, attempt, "write conflict");
                }
                Err(e) => {
                    // The backend may have committed before failing
                    self.state.lock().in_doubt = Some(InDoubtWrite {
                        id: write_id,
                        written,
                    });
                    tracing::debug!(key = %self.key, attempt, error = %e, "write failed");
                }
            }
        }

        tracing::warn!(key = %self.key, attempts = retry.attempts(), "write retries exhausted");
        Err(StrataError::RetriesExhausted {
            key: self.key.to_string(),
            attempts: retry.attempts(),
        })
    }

    /// Adopt remote changes without writing
    pub(crate) async fn pull(&self) -> Result<()> {
        let _writer = self.write_gate.lock().await;
        self.check_not_bad()?;
        let remote = self.store.backend.read(&self.key).await?;
        self.resolve_in_doubt(remote.as_ref());
        self.rebase(remote)?;
        Ok(())
    }

    /// Settle a write whose acknowledgement was lost
    ///
    /// If `remote` is that write, its log prefix is confirmed instead of
    /// being replayed on top of itself. Otherwise the write never landed.
    fn resolve_in_doubt(&self, remote: Option<&RemoteRecord>) {
        let mut state = self.state.lock();
        let Some(in_doubt) = state.in_doubt.take() else {
            return;
        };
        let Some(remote) = remote.filter(|r| r.record.written_by(&in_doubt.id)) else {
            return;
        };
        state.log.truncate_front(in_doubt.written);
        state.synced_token = Some(remote.token.clone());
        tracing::debug!(
            key = %self.key,
            written = in_doubt.written,
            "confirmed write with lost acknowledgement"
        );
    }

    /// Bring the session up to date with `remote`
    ///
    /// Replays the log on the remote value if someone else wrote since the
    /// last sync. Returns the record to write and the number of log entries
    /// it covers, or `None` if the log is empty.
    fn rebase(&self, remote: Option<RemoteRecord>) -> Result<Option<(StoredRecord, usize)>> {
        let prepared = self.rebase_locked(remote);
        self.deliver();
        prepared
    }

    fn rebase_locked(
        &self,
        remote: Option<RemoteRecord>,
    ) -> Result<Option<(StoredRecord, usize)>> {
        let _gate = self.gate.lock();
        let observed = remote.as_ref().map(|r| r.token.clone());
        let remote_users = remote
            .as_ref()
            .map(|r| r.record.user_ids.clone())
            .unwrap_or_default();

        let (stale, entries) = {
            let state = self.state.lock();
            if let Some(reason) = state.bad {
                return Err(StrataError::quarantined(&self.key, reason));
            }
            (observed != state.synced_token, state.log.entries().to_vec())
        };

        if stale {
            let base = match remote {
                None => (self.store.default_data)(),
                Some(remote) => match self.store.monitor.admit(&self.key, remote.record) {
                    Ok(value) => value,
                    Err(reason) => return Err(self.quarantine(&mut self.state.lock(), reason)),
                },
            };

            let strict = self.store.strict.enabled();
            let replayed = match replay(&self.store.registry, base, &entries, strict) {
                Ok(replayed) => replayed,
                Err(ReplayError::Unrecognized(action)) => {
                    tracing::warn!(key = %self.key, action = %action, "log references an unknown action");
                    return Err(self.quarantine(
                        &mut self.state.lock(),
                        BadReason::UnrecognizedTransaction,
                    ));
                }
            };
            for (entry, error) in &replayed.dropped {
                tracing::warn!(
                    key = %self.key,
                    action = %entry.action,
                    error = %error,
                    "dropping action rejected during replay"
                );
            }

            let mut state = self.state.lock();
            state.log.replace(replayed.kept);
            state.synced_token = observed;
            if replayed.value != state.value {
                state.value = replayed.value.clone();
                self.publish(replayed.value);
            }
        }

        self.prepare_record(remote_users)
    }

    fn prepare_record(
        &self,
        remote_users: std::collections::BTreeSet<u64>,
    ) -> Result<Option<(StoredRecord, usize)>> {
        let state = self.state.lock();
        let pending = state.log.len();
        if pending == 0 {
            return Ok(None);
        }
        let value = serde_json::to_value(&state.value)?;
        let user_ids = if self.user_ids.is_empty() {
            remote_users
        } else {
            self.user_ids.clone()
        };
        let record =
            StoredRecord::new(value, self.store.monitor.latest_step()).with_user_ids(user_ids);
        Ok(Some((record, pending)))
    }

    fn confirm_write(&self, written: usize, token: VersionToken) {
        let mut state = self.state.lock();
        state.in_doubt = None;
        state.log.truncate_front(written);
        state.synced_token = Some(token);
    }

    fn log_len(&self) -> usize {
        self.state.lock().log.len()
    }

    /// One autosave round; false once the session no longer needs syncing
    async fn tick(&self) -> bool {
        let (status, bad, idle) = {
            let state = self.state.lock();
            (state.status, state.bad.is_some(), state.log.is_empty())
        };
        if bad {
            return false;
        }
        let result = match status {
            SessionStatus::Stopped => return false,
            SessionStatus::Loading => {
                self.begin_op();
                self.load_once().await
            }
            SessionStatus::Loaded if idle => {
                self.begin_op();
                self.pull().await
            }
            SessionStatus::Loaded => {
                self.begin_op();
                self.flush().await
            }
        };
        self.end_op(result);
        true
    }
}

/// Background sync loop of one session
///
/// Holds only a weak reference between ticks, so dropping every handle to a
/// session ends its loop.
pub(crate) async fn autosave<T: Data>(
    session: Weak<SessionInner<T>>,
    shutdown: Arc<Notify>,
    delay: Duration,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.notified() => return,
        }
        let Some(inner) = session.upgrade() else {
            return;
        };
        if !inner.tick().await {
            return;
        }
    }
}
