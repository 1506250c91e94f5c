//! Bad data monitor
//!
//! Every record coming from the backend passes through the monitor before a
//! session may use it:
//!
//! ```text
//! stored record ──► migrate ──► schema check ──► decode ──► T
//!                     │              │              │
//!              UnknownMigration  SchemaMismatch  SchemaMismatch
//! ```
//!
//! A record that fails any stage quarantines the session that read it. The
//! record itself is left untouched on the backend.

use crate::migration::{MigrationError, MigrationPipeline};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use strata_core::error::{Result, StrataError};
use strata_core::traits::Data;
use strata_core::types::{BadReason, RecordKey};
use strata_core::StoredRecord;

/// Predicate over the migrated JSON value
pub type Schema = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Validates and decodes stored records for one store
pub struct BadDataMonitor<T> {
    pipeline: MigrationPipeline,
    schema: Option<Schema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Data> BadDataMonitor<T> {
    /// Create a monitor over a migration pipeline and optional schema
    pub fn new(pipeline: MigrationPipeline, schema: Option<Schema>) -> Self {
        Self {
            pipeline,
            schema,
            _marker: PhantomData,
        }
    }

    /// Migration pipeline used by this monitor
    pub fn pipeline(&self) -> &MigrationPipeline {
        &self.pipeline
    }

    /// Step written alongside every outgoing record
    pub fn latest_step(&self) -> &str {
        self.pipeline.latest_step()
    }

    /// Migrate, validate and decode a record read for `key`
    ///
    /// Failures are logged and reported as the quarantine cause.
    pub fn admit(&self, key: &RecordKey, record: StoredRecord) -> std::result::Result<T, BadReason> {
        let migrated = self.pipeline.apply(record).map_err(|e| {
            let MigrationError::UnknownStep(step) = &e;
            tracing::warn!(key = %key, step = %step, "stored record has an unknown migration step");
            BadReason::UnknownMigration
        })?;

        if let Some(schema) = &self.schema {
            if !schema(&migrated.value) {
                tracing::warn!(key = %key, "stored record fails the schema check");
                return Err(BadReason::SchemaMismatch);
            }
        }

        serde_json::from_value(migrated.value).map_err(|e| {
            tracing::warn!(key = %key, error = %e, "stored record does not decode");
            BadReason::SchemaMismatch
        })
    }

    /// Migrate and decode without the schema check
    ///
    /// Used for read-only historical lookups, which never quarantine.
    pub fn decode_unchecked(&self, record: StoredRecord) -> Result<T> {
        let migrated = self
            .pipeline
            .apply(record)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;
        Ok(serde_json::from_value(migrated.value)?)
    }
}

impl<T> std::fmt::Debug for BadDataMonitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BadDataMonitor")
            .field("pipeline", &self.pipeline)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}
