//! Core types and traits for strata-session
//!
//! This crate defines the foundational types shared by every layer:
//! - RecordKey / VersionToken / Timestamp: record identity and versioning
//! - StoredRecord / RemoteRecord: what the backend persists
//! - BadReason: quarantine causes
//! - StrictMode: process-wide purity and serializability checks
//! - Backend: the remote versioned store seam
//! - StrataError: the canonical internal error

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod strict;
pub mod traits;
pub mod types;

pub use error::{Result, StrataError};
pub use record::{RemoteRecord, StoredRecord, WriteOutcome};
pub use strict::StrictMode;
pub use traits::{Backend, Data};
pub use types::{BadReason, RecordKey, SessionId, Timestamp, VersionToken, WriteId, DEFAULT_SCOPE};
