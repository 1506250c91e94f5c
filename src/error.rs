//! Unified error types for Strata sessions.
//!
//! This module provides a clean error type that wraps internal errors
//! and presents a consistent interface to users.

use strata_core::types::BadReason;
use thiserror::Error;

/// All Strata session errors.
///
/// `Clone`, so the outcome of one background operation can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The session's data is quarantined
    #[error("quarantined: {key} ({reason})")]
    Quarantined {
        /// Session key
        key: String,
        /// Quarantine cause
        reason: BadReason,
    },

    /// Conditional writes kept conflicting, or the backend kept failing
    #[error("conflict: {0}")]
    Conflict(String),

    /// Action not registered with the session's store
    #[error("action not found: {0}")]
    ActionNotFound(String),

    /// Action rejected its input (including strict mode rejections)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Session not loaded yet, or already stopped
    #[error("session unavailable: {0}")]
    Unavailable(String),

    /// Invalid input or configuration
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Transaction aborted
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend error
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Conflicts and backend failures may succeed later with fresh data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Backend(_))
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if this error comes from quarantined data.
    pub fn is_quarantine(&self) -> bool {
        matches!(self, Error::Quarantined { .. })
    }

    /// Quarantine cause, if any.
    pub fn bad_reason(&self) -> Option<BadReason> {
        match self {
            Error::Quarantined { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

// Convert from internal StrataError
impl From<strata_core::error::StrataError> for Error {
    fn from(e: strata_core::error::StrataError) -> Self {
        use strata_core::error::StrataError as SE;
        match e {
            SE::Quarantined { key, reason } => Error::Quarantined { key, reason },
            SE::RetriesExhausted { .. } => Error::Conflict(e.to_string()),
            SE::Backend { .. } => Error::Backend(e.to_string()),
            SE::ActionNotFound { action } => Error::ActionNotFound(action),
            SE::ActionRejected { .. } | SE::StrictViolation { .. } => Error::Rejected(e.to_string()),
            SE::DuplicateAction { .. } | SE::InvalidConfig(_) | SE::InvalidOperation(_) => {
                Error::ConstraintViolation(e.to_string())
            }
            SE::NotLoaded { .. } | SE::Stopped { .. } => Error::Unavailable(e.to_string()),
            SE::Serialization(msg) => Error::Serialization(msg),
            SE::TransactionAborted { reason } => Error::TransactionAborted(reason),
        }
    }
}
