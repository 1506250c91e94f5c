//! Trait seams between the engine and the outside world
//!
//! - [`Backend`]: the remote versioned key-value store
//! - [`Data`]: bound for values held by sessions

use crate::error::Result;
use crate::record::{RemoteRecord, StoredRecord, WriteOutcome};
use crate::types::{RecordKey, Timestamp, VersionToken};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Remote versioned key-value backend
///
/// The backend offers no locking. Its only concurrency primitive is the
/// conditional write: a record is replaced only if the caller presents the
/// token it last observed.
///
/// # Contract
///
/// - `read` returns the current record and its token, or `None` if absent
/// - `write_if_unchanged` with `expected = Some(t)` succeeds only while the
///   current token is `t`; with `expected = None` it succeeds only while the
///   key is absent
/// - every successful write issues a fresh token
/// - `read_version` and `read_at` are historical, read-only lookups
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Read the current record and its token
    async fn read(&self, key: &RecordKey) -> Result<Option<RemoteRecord>>;

    /// Write `record` if the current token still equals `expected`
    async fn write_if_unchanged(
        &self,
        key: &RecordKey,
        record: StoredRecord,
        expected: Option<&VersionToken>,
    ) -> Result<WriteOutcome>;

    /// Read the record written with the given token
    async fn read_version(
        &self,
        key: &RecordKey,
        token: &VersionToken,
    ) -> Result<Option<StoredRecord>>;

    /// Read the record that was current at the given time
    async fn read_at(&self, key: &RecordKey, at: Timestamp) -> Result<Option<StoredRecord>>;
}

/// Values that can live in a session
///
/// Values are cloned for replay, compared to detect changes, and encoded to
/// JSON for the backend.
pub trait Data: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Data for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}
