//! Error types for the session layer
//!
//! [`StrataError`] is the canonical internal error shared by every crate in
//! the workspace. It is `Clone` so that the outcome of one background
//! operation can be handed to every caller waiting on it.

use crate::types::{BadReason, RecordKey};
use thiserror::Error;

/// Canonical internal error
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrataError {
    /// The backend failed to serve a request
    #[error("backend error on {key}: {message}")]
    Backend {
        /// Key being accessed
        key: String,
        /// Backend message
        message: String,
    },

    /// Conditional writes kept conflicting until retries ran out
    #[error("write to {key} gave up after {attempts} attempt(s)")]
    RetriesExhausted {
        /// Key being written
        key: String,
        /// Attempts made
        attempts: usize,
    },

    /// The referenced action is not registered with this store
    #[error("action not found: {action}")]
    ActionNotFound {
        /// Action identity
        action: String,
    },

    /// The action function rejected the input
    #[error("action {action} rejected: {reason}")]
    ActionRejected {
        /// Action identity
        action: String,
        /// Reason given by the action
        reason: String,
    },

    /// A transactional action name was registered twice
    #[error("transactional action '{name}' is already registered")]
    DuplicateAction {
        /// Offending name
        name: String,
    },

    /// The session data is quarantined
    #[error("session {key} is quarantined: {reason}")]
    Quarantined {
        /// Session key
        key: String,
        /// Quarantine cause
        reason: BadReason,
    },

    /// The session has not finished loading
    #[error("session {key} is not loaded")]
    NotLoaded {
        /// Session key
        key: String,
    },

    /// The session was stopped
    #[error("session {key} is stopped")]
    Stopped {
        /// Session key
        key: String,
    },

    /// Operation not valid in the current context
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Store or database configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Strict mode rejected an action result
    #[error("strict mode violation in {action}: {reason}")]
    StrictViolation {
        /// Action identity
        action: String,
        /// What the check found
        reason: String,
    },

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transaction aborted
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Why the transaction aborted
        reason: String,
    },
}

/// Result type for internal operations
pub type Result<T> = std::result::Result<T, StrataError>;

impl StrataError {
    /// Create a backend error for a key
    pub fn backend(key: &RecordKey, message: impl Into<String>) -> Self {
        StrataError::Backend {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Create a quarantine error for a key
    pub fn quarantined(key: &RecordKey, reason: BadReason) -> Self {
        StrataError::Quarantined {
            key: key.to_string(),
            reason,
        }
    }

    /// Check if this error is retryable
    ///
    /// Backend failures and exhausted write retries may succeed on a later
    /// attempt with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrataError::Backend { .. } | StrataError::RetriesExhausted { .. }
        )
    }

    /// Check if this error comes from quarantined data
    pub fn is_quarantine(&self) -> bool {
        matches!(self, StrataError::Quarantined { .. })
    }

    /// Check if this error is an action rejection (including strict mode)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StrataError::ActionRejected { .. } | StrataError::StrictViolation { .. }
        )
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(e: serde_json::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}
