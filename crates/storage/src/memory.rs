//! In-process backend
//!
//! [`MemoryBackend`] implements [`Backend`] over a [`ShardedStore`]. It stands
//! in for the remote store in tests and local development: several databases
//! sharing one `MemoryBackend` behave like several processes sharing a
//! remote store.
//!
//! Fault injection (`fail_next_reads`, `conflict_next_writes`,
//! `lose_next_acks`) lets tests drive the retry paths deterministically.

use crate::sharded::ShardedStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::error::Result;
use strata_core::traits::Backend;
use strata_core::types::RecordKey;
use strata_core::{RemoteRecord, StoredRecord, StrataError, Timestamp, VersionToken, WriteOutcome};

/// Request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Current-record reads served
    pub reads: u64,
    /// Conditional writes applied
    pub writes: u64,
    /// Conditional writes rejected
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Faults {
    failing_reads: usize,
    conflicting_writes: usize,
    lost_acks: usize,
}

/// Versioned in-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: ShardedStore,
    faults: Mutex<Faults>,
    reads: AtomicU64,
    writes: AtomicU64,
    conflicts: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record unconditionally, as an external writer would
    pub fn seed(&self, key: &RecordKey, record: StoredRecord) -> VersionToken {
        self.store.put(key, record)
    }

    /// Current record without counting it as a request
    pub fn peek(&self, key: &RecordKey) -> Option<RemoteRecord> {
        self.store.get(key)
    }

    /// Number of revisions written for a key
    pub fn revision_count(&self, key: &RecordKey) -> usize {
        self.store.revision_count(key)
    }

    /// Make the next `n` current-record reads fail
    pub fn fail_next_reads(&self, n: usize) {
        self.faults.lock().failing_reads = n;
    }

    /// Make the next `n` conditional writes report a conflict
    pub fn conflict_next_writes(&self, n: usize) {
        self.faults.lock().conflicting_writes = n;
    }

    /// Make the next `n` successful conditional writes report an error
    ///
    /// The record is committed; only the acknowledgement is lost.
    pub fn lose_next_acks(&self, n: usize) {
        self.faults.lock().lost_acks = n;
    }

    /// Request counters so far
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    fn take_fault(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, key: &RecordKey) -> Result<Option<RemoteRecord>> {
        if Self::take_fault(&mut self.faults.lock().failing_reads) {
            return Err(StrataError::backend(key, "injected read failure"));
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.store.get(key))
    }

    async fn write_if_unchanged(
        &self,
        key: &RecordKey,
        record: StoredRecord,
        expected: Option<&VersionToken>,
    ) -> Result<WriteOutcome> {
        let injected = Self::take_fault(&mut self.faults.lock().conflicting_writes);
        let outcome = if injected {
            WriteOutcome::Conflict
        } else {
            self.store.compare_and_set(key, record, expected)
        };
        match &outcome {
            WriteOutcome::Written(token) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, token = %token, "record written");
                if Self::take_fault(&mut self.faults.lock().lost_acks) {
                    return Err(StrataError::backend(key, "injected lost acknowledgement"));
                }
            }
            WriteOutcome::Conflict => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, injected, "conditional write rejected");
            }
        }
        Ok(outcome)
    }

    async fn read_version(
        &self,
        key: &RecordKey,
        token: &VersionToken,
    ) -> Result<Option<StoredRecord>> {
        Ok(self.store.get_version(key, token))
    }

    async fn read_at(&self, key: &RecordKey, at: Timestamp) -> Result<Option<StoredRecord>> {
        Ok(self.store.get_as_of(key, at))
    }
}
