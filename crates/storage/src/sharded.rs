//! Sharded versioned record storage
//!
//! Records are partitioned by `(store, scope)` namespace using DashMap, with
//! an FxHashMap of key histories inside each shard.
//!
//! # Design
//!
//! - DashMap: one shard per namespace, reads of different stores never contend
//! - FxHashMap: O(1) lookups within a shard
//! - Full history per key: every committed revision is kept so historical
//!   reads by token or by timestamp can be served
//!
//! The conditional write checks the current token and appends the new
//! revision while holding the shard's write guard, so check and apply are
//! atomic with respect to other writers.

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use strata_core::{RemoteRecord, StoredRecord, Timestamp, VersionToken, WriteOutcome};
use strata_core::types::RecordKey;

/// One committed revision of a record
#[derive(Debug, Clone)]
pub struct Revision {
    /// Token issued for this revision
    pub token: VersionToken,
    /// Record as written
    pub record: StoredRecord,
}

/// Revision history of a single key, oldest first
#[derive(Debug, Default)]
pub struct KeyHistory {
    revisions: Vec<Revision>,
}

impl KeyHistory {
    /// Latest revision, if any
    pub fn latest(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    /// Revision with the given token
    pub fn by_token(&self, token: &VersionToken) -> Option<&Revision> {
        self.revisions.iter().find(|rev| &rev.token == token)
    }

    /// Latest revision written at or before `at`
    pub fn as_of(&self, at: Timestamp) -> Option<&Revision> {
        self.revisions
            .iter()
            .filter(|rev| rev.record.written_at <= at)
            .max_by_key(|rev| rev.record.written_at)
    }

    /// Number of revisions
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Whether no revision was ever written
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    fn push(&mut self, record: StoredRecord) -> VersionToken {
        let token = VersionToken::generate();
        self.revisions.push(Revision {
            token: token.clone(),
            record,
        });
        token
    }
}

/// Per-namespace shard
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) data: FxHashMap<String, KeyHistory>,
}

impl Shard {
    /// Number of keys in this shard
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether this shard holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

type NamespaceId = (String, String);

fn namespace_of(key: &RecordKey) -> NamespaceId {
    (key.store.clone(), key.scope.clone())
}

/// Sharded storage - DashMap by namespace, HashMap within
///
/// # Thread Safety
///
/// All operations are thread-safe:
/// - reads take a shard read guard
/// - writes lock only the target namespace's shard
/// - different stores never contend
#[derive(Debug, Default)]
pub struct ShardedStore {
    shards: DashMap<NamespaceId, Shard>,
}

impl ShardedStore {
    /// Create new sharded store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
        }
    }

    /// Get number of shards (namespaces)
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Current record and token for a key
    pub fn get(&self, key: &RecordKey) -> Option<RemoteRecord> {
        self.shards.get(&namespace_of(key)).and_then(|shard| {
            shard
                .data
                .get(&key.key)
                .and_then(KeyHistory::latest)
                .map(|rev| RemoteRecord::new(rev.record.clone(), rev.token.clone()))
        })
    }

    /// Record written with a specific token
    pub fn get_version(&self, key: &RecordKey, token: &VersionToken) -> Option<StoredRecord> {
        self.shards.get(&namespace_of(key)).and_then(|shard| {
            shard
                .data
                .get(&key.key)
                .and_then(|history| history.by_token(token))
                .map(|rev| rev.record.clone())
        })
    }

    /// Record current at a point in time
    pub fn get_as_of(&self, key: &RecordKey, at: Timestamp) -> Option<StoredRecord> {
        self.shards.get(&namespace_of(key)).and_then(|shard| {
            shard
                .data
                .get(&key.key)
                .and_then(|history| history.as_of(at))
                .map(|rev| rev.record.clone())
        })
    }

    /// Compare-and-set
    ///
    /// Appends `record` as a new revision only if the key's current token
    /// equals `expected` (`None` = key must be absent).
    pub fn compare_and_set(
        &self,
        key: &RecordKey,
        record: StoredRecord,
        expected: Option<&VersionToken>,
    ) -> WriteOutcome {
        let mut shard = self.shards.entry(namespace_of(key)).or_default();
        let history = shard.data.entry(key.key.clone()).or_default();
        let current = history.latest().map(|rev| &rev.token);
        if current != expected {
            return WriteOutcome::Conflict;
        }
        WriteOutcome::Written(history.push(record))
    }

    /// Unconditional write, returns the new token
    pub fn put(&self, key: &RecordKey, record: StoredRecord) -> VersionToken {
        let mut shard = self.shards.entry(namespace_of(key)).or_default();
        shard.data.entry(key.key.clone()).or_default().push(record)
    }

    /// Number of revisions recorded for a key
    pub fn revision_count(&self, key: &RecordKey) -> usize {
        self.shards
            .get(&namespace_of(key))
            .and_then(|shard| shard.data.get(&key.key).map(KeyHistory::len))
            .unwrap_or(0)
    }

    /// Total number of keys across all shards
    pub fn total_keys(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }
}
