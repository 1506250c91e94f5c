//! Convenient imports for Strata sessions.
//!
//! This module re-exports the most commonly used types so you can get started
//! with a single import:
//!
//! ```ignore
//! use strata_session::prelude::*;
//!
//! let db = Strata::ephemeral()?;
//! let store = db.store(StoreConfig::new("counters", || 0i64))?;
//! ```

// Main entry point
pub use crate::database::{Strata, StrataBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Stores and sessions
pub use crate::{Session, SessionStatus, Store, StoreConfig, View};

// Actions and transactions
pub use crate::{Action, ActionResult, Rejected, Transaction};

// Core types
pub use crate::{BadReason, RecordKey, RetryConfig, VersionToken};
