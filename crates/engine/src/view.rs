//! Read-only historical access
//!
//! A [`View`] reads a key without loading a session. Values are migrated so
//! they can be typed, but views never quarantine and skip the schema check.

use crate::store::StoreInner;
use std::sync::Arc;
use strata_core::error::Result;
use strata_core::traits::Data;
use strata_core::types::{RecordKey, Timestamp, VersionToken};
use strata_core::StoredRecord;

/// Read-only handle to one key
pub struct View<T> {
    store: Arc<StoreInner<T>>,
    key: RecordKey,
}

impl<T: Data> View<T> {
    pub(crate) fn new(store: Arc<StoreInner<T>>, key: RecordKey) -> Self {
        Self { store, key }
    }

    /// Record key
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Current value, or `None` if the key was never written
    pub async fn latest(&self) -> Result<Option<T>> {
        let remote = self.store.backend.read(&self.key).await?;
        self.decode(remote.map(|r| r.record))
    }

    /// Value written with `token`
    pub async fn version(&self, token: &VersionToken) -> Result<Option<T>> {
        let record = self.store.backend.read_version(&self.key, token).await?;
        self.decode(record)
    }

    /// Value that was current at `unix_secs`
    pub async fn timestamp(&self, unix_secs: i64) -> Result<Option<T>> {
        let at = Timestamp::from_unix_secs(unix_secs);
        let record = self.store.backend.read_at(&self.key, at).await?;
        self.decode(record)
    }

    fn decode(&self, record: Option<StoredRecord>) -> Result<Option<T>> {
        record
            .map(|record| self.store.monitor.decode_unchecked(record))
            .transpose()
    }
}

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
        }
    }
}

impl<T> std::fmt::Debug for View<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View").field("key", &self.key).finish()
    }
}
