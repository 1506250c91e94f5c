//! Per-session action log
//!
//! The log holds every action applied to a session since its last confirmed
//! remote write, in application order. It is the input to replay: applying
//! the log in order on top of the last synced remote value reproduces the
//! session's in-memory value.

use serde::{Deserialize, Serialize};

/// Stable identity of a registered action
///
/// Normal actions are anonymous and get a numeric id from their store's
/// registry. Transactional actions are addressed by their unique name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKey {
    /// Anonymous action applied immediately
    Normal(u64),
    /// Named action applied only inside a transaction
    Transaction(String),
}

impl ActionKey {
    /// Whether this is a transactional action
    pub fn is_transaction(&self) -> bool {
        matches!(self, ActionKey::Transaction(_))
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKey::Normal(id) => write!(f, "action#{}", id),
            ActionKey::Transaction(name) => write!(f, "transaction '{}'", name),
        }
    }
}

/// An action and its encoded parameters, not yet in any log
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Action to run
    pub action: ActionKey,
    /// JSON-encoded parameters
    pub params: serde_json::Value,
}

/// One applied action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Action that was applied
    pub action: ActionKey,
    /// JSON-encoded parameters
    pub params: serde_json::Value,
    /// Position in the session's log (monotonic, never reused)
    pub index: u64,
}

/// Append-only log of applied actions
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: Vec<LogEntry>,
    next_index: u64,
}

impl ActionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an applied action, returning its index
    pub fn push(&mut self, pending: PendingAction) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.push(LogEntry {
            action: pending.action,
            params: pending.params,
            index,
        });
        index
    }

    /// Entries in application order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the first `n` entries after they were persisted
    ///
    /// Entries appended after the write was prepared are kept.
    pub fn truncate_front(&mut self, n: usize) {
        let n = n.min(self.entries.len());
        self.entries.drain(..n);
    }

    /// Replace the entries after a replay
    ///
    /// Indices keep increasing from where they were.
    pub fn replace(&mut self, entries: Vec<LogEntry>) {
        self.entries = entries;
    }
}
