//! Core types for the session layer
//!
//! This module defines the fundamental identifiers used throughout the system:
//! - [`RecordKey`]: Identity of one remote record (store, scope, key)
//! - [`VersionToken`]: Opaque backend-issued token for conditional writes
//! - [`WriteId`]: Client-issued identity of one write attempt
//! - [`Timestamp`]: Microsecond wall-clock timestamp
//! - [`SessionId`]: Process-local identity of a live session

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Scope used when a store does not name one.
pub const DEFAULT_SCOPE: &str = "global";

/// Identity of one persisted record
///
/// A record lives inside a named store and scope. Two keys are the same
/// remote record if and only if all three components match.
///
/// # Examples
///
/// ```
/// use strata_core::types::RecordKey;
///
/// let key = RecordKey::new("players", "global", "p1");
/// assert_eq!(key.to_string(), "players/global/p1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Store name
    pub store: String,
    /// Scope within the store
    pub scope: String,
    /// Key within the scope
    pub key: String,
}

impl RecordKey {
    /// Create a new record key
    pub fn new(store: impl Into<String>, scope: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            scope: scope.into(),
            key: key.into(),
        }
    }

    /// Create a key in the default scope
    pub fn global(store: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(store, DEFAULT_SCOPE, key)
    }

    /// The `(store, scope)` pair this key belongs to
    pub fn namespace(&self) -> (&str, &str) {
        (&self.store, &self.scope)
    }
}

impl std::fmt::Display for RecordKey {
    /// Display key in the format: store/scope/key
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.store, self.scope, self.key)
    }
}

/// Opaque version token issued by the backend
///
/// A token must be presented unchanged to perform a conditional write.
/// Tokens are only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wrap a backend-provided token
    pub fn new(token: impl Into<String>) -> Self {
        VersionToken(token.into())
    }

    /// Generate a fresh random token (UUID v4)
    pub fn generate() -> Self {
        VersionToken(Uuid::new_v4().to_string())
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionToken {
    fn from(s: &str) -> Self {
        VersionToken::new(s)
    }
}

/// Client-issued identity of one write attempt
///
/// Stamped on every outgoing record so a writer can recognize its own
/// write when the backend's acknowledgement was lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteId(String);

impl WriteId {
    /// Generate a fresh random id (UUID v4)
    pub fn generate() -> Self {
        WriteId(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for WriteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wall-clock timestamp in microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Current time
    pub fn now() -> Self {
        let micros = chrono::Utc::now().timestamp_micros();
        Timestamp(micros.max(0) as u64)
    }

    /// Create from microseconds since epoch
    pub fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create from whole seconds since epoch
    pub fn from_unix_secs(secs: i64) -> Self {
        Timestamp((secs.max(0) as u64).saturating_mul(1_000_000))
    }

    /// Microseconds since epoch
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Whole seconds since epoch
    pub fn as_unix_secs(&self) -> i64 {
        (self.0 / 1_000_000) as i64
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp_micros(self.0 as i64) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}us", self.0),
        }
    }
}

/// Process-local identity of a live session
///
/// Session ids give the transaction coordinator a stable lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Allocate the next session id
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Reason a session's data was quarantined
///
/// Quarantine is one-way: once a session has a bad reason it refuses all
/// further patches and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadReason {
    /// An action referenced by the log (or loaded data) is not registered
    UnrecognizedTransaction,
    /// The persisted migration step is not a known step
    UnknownMigration,
    /// The loaded value failed the store's schema predicate
    SchemaMismatch,
}

impl BadReason {
    /// Stable snake_case name of the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            BadReason::UnrecognizedTransaction => "unrecognized_transaction",
            BadReason::UnknownMigration => "unknown_migration",
            BadReason::SchemaMismatch => "schema_mismatch",
        }
    }
}

impl std::fmt::Display for BadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
