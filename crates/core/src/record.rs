//! Persisted record types
//!
//! A [`StoredRecord`] is what the backend holds for one [`RecordKey`](crate::RecordKey).
//! The backend pairs every record with a [`VersionToken`]; the pair is a
//! [`RemoteRecord`].

use crate::types::{Timestamp, VersionToken, WriteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A record as persisted by the backend
///
/// `value` is kept untyped: records written by older or newer clients may
/// not match the current shape until they have been migrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Raw stored value
    pub value: serde_json::Value,
    /// Migration step the value is at ("" = pre-migration)
    pub step: String,
    /// When the record was written
    pub written_at: Timestamp,
    /// User ids associated with the record
    pub user_ids: BTreeSet<u64>,
    /// Write attempt that produced the record, if written by a session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_id: Option<WriteId>,
}

impl StoredRecord {
    /// Create a record stamped with the current time
    pub fn new(value: serde_json::Value, step: impl Into<String>) -> Self {
        Self {
            value,
            step: step.into(),
            written_at: Timestamp::now(),
            user_ids: BTreeSet::new(),
            write_id: None,
        }
    }

    /// Attach user ids
    pub fn with_user_ids(mut self, user_ids: impl IntoIterator<Item = u64>) -> Self {
        self.user_ids = user_ids.into_iter().collect();
        self
    }

    /// Stamp the write attempt that carries this record
    pub fn with_write_id(mut self, write_id: WriteId) -> Self {
        self.write_id = Some(write_id);
        self
    }

    /// Whether `write_id` produced this record
    pub fn written_by(&self, write_id: &WriteId) -> bool {
        self.write_id.as_ref() == Some(write_id)
    }

    /// Whether the record predates every migration
    pub fn is_pre_migration(&self) -> bool {
        self.step.is_empty()
    }
}

/// A record together with the token the backend issued for it
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// The stored record
    pub record: StoredRecord,
    /// Token that must be presented to overwrite this record
    pub token: VersionToken,
}

impl RemoteRecord {
    /// Pair a record with its token
    pub fn new(record: StoredRecord, token: VersionToken) -> Self {
        Self { record, token }
    }
}

/// Outcome of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied; the record now carries this token
    Written(VersionToken),
    /// The presented token no longer matches; nothing was written
    Conflict,
}

impl WriteOutcome {
    /// Whether the write was rejected
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict)
    }
}
