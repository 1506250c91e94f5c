//! Concurrency layer for strata-session
//!
//! This crate implements lock-free reconciliation between sessions:
//! - ActionLog: per-session append-only log of applied actions
//! - ActionRegistry: stable identities for pure transform functions
//! - replay: deterministic re-application of a log onto a newer base
//! - RetryConfig: bounded exponential backoff for conditional writes
//! - TransactionCoordinator: all-or-nothing commits across sessions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod log;
pub mod manager;
pub mod registry;
pub mod replay;
pub mod retry;
pub mod transaction;

pub use log::{ActionKey, ActionLog, LogEntry, PendingAction};
pub use manager::{TransactionCoordinator, TransactionMetrics};
pub use registry::{Action, ActionRegistry, ActionResult, Rejected};
pub use replay::{replay, ReplayError, Replayed};
pub use retry::RetryConfig;
pub use transaction::{
    ActionSource, Participant, StagedCommit, Transaction, TransactionId, TransactionStatus,
};
