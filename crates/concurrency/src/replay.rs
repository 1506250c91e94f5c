//! Deterministic log replay
//!
//! When a session discovers that another writer committed since its last
//! sync, it rebuilds its value by re-applying its local log, in original
//! order, on top of the remote value. Because actions are pure functions of
//! `(old_value, params)`, replaying the same log against the same base always
//! yields the same result.
//!
//! ## Entry outcomes
//!
//! - Applied: the entry stays in the log
//! - Rejected by the action (or by strict mode) against the new base: the
//!   entry is dropped, as if it had been rejected when first patched
//! - Action not registered: replay stops; the log cannot be reproduced and
//!   the session must be quarantined

use crate::log::{ActionKey, LogEntry};
use crate::registry::ActionRegistry;
use strata_core::error::StrataError;
use strata_core::traits::Data;

/// Result of a successful replay
#[derive(Debug, Clone)]
pub struct Replayed<T> {
    /// Reconciled value
    pub value: T,
    /// Entries that applied cleanly, in order
    pub kept: Vec<LogEntry>,
    /// Entries rejected against the new base, with the rejection
    pub dropped: Vec<(LogEntry, StrataError)>,
}

impl<T> Replayed<T> {
    /// Whether every entry was kept
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Replay failure that poisons the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// A log entry references an action the registry does not know
    Unrecognized(ActionKey),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Unrecognized(key) => write!(f, "unrecognized {} in log", key),
        }
    }
}

impl std::error::Error for ReplayError {}

/// Re-apply `log` in order on top of `base`
pub fn replay<T: Data>(
    registry: &ActionRegistry<T>,
    base: T,
    log: &[LogEntry],
    strict: bool,
) -> Result<Replayed<T>, ReplayError> {
    let mut value = base;
    let mut kept = Vec::with_capacity(log.len());
    let mut dropped = Vec::new();

    for entry in log {
        match registry.invoke(&entry.action, &value, &entry.params, strict) {
            Ok(next) => {
                value = next;
                kept.push(entry.clone());
            }
            Err(StrataError::ActionNotFound { .. }) => {
                return Err(ReplayError::Unrecognized(entry.action.clone()));
            }
            Err(e) => dropped.push((entry.clone(), e)),
        }
    }

    Ok(Replayed {
        value,
        kept,
        dropped,
    })
}
