//! # Strata Sessions
//!
//! Lock-free client sessions over versioned key-value backends.
//!
//! A process loads a key into a [`Session`], mutates it synchronously with
//! registered actions, and lets a background task persist the changes with
//! conditional writes. When another writer got there first, the session
//! replays its own actions on top of the newer value and tries again.
//!
//! ## Quick Start
//!
//! ```ignore
//! use strata_session::prelude::*;
//!
//! let db = Strata::ephemeral()?;
//! let players = db.store(
//!     StoreConfig::new("players", Player::default)
//!         .migration("v1", add_coins),
//! )?;
//! let earn = players.action(|mut p: Player, n: &i64| {
//!     p.coins += n;
//!     Ok(p)
//! });
//!
//! let alice = players.load("alice");
//! alice.wait().await?;
//! alice.patch(&earn, 5)?;
//!
//! // Final flush, then done
//! alice.stop();
//! alice.wait().await?;
//! ```
//!
//! ## Building Blocks
//!
//! - [`Store`] - a typed, named collection of records
//! - [`Session`] - exclusive in-memory owner of one record
//! - [`Action`] - registered pure transform `(value, params) -> value`
//! - [`Strata::transaction`] - all-or-nothing actions across sessions
//! - [`View`] - read-only historical access
//! - [`MemoryBackend`] - in-process backend for tests

#![warn(missing_docs)]

mod database;
mod error;

pub mod prelude;

// Re-export main entry points
pub use database::{DatabaseMetrics, Strata, StrataBuilder};
pub use error::{Error, Result};

// Re-export engine handles
pub use strata_concurrency::{Action, ActionResult, Rejected, RetryConfig, Transaction};
pub use strata_core::{
    Backend, BadReason, Data, RecordKey, RemoteRecord, StoredRecord, Timestamp, VersionToken,
    WriteOutcome,
};
pub use strata_engine::{Migration, Session, SessionStatus, Store, StoreConfig, View};
pub use strata_storage::{BackendStats, MemoryBackend};
