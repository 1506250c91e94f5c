//! Migration pipeline
//!
//! Carries stored records forward through an ordered list of steps.
//!
//! ## Rules
//!
//! - Steps are unique, non-empty names; their order is the migration order
//! - A record with an empty step predates every migration and receives all
//!   of them
//! - A record at step `s` receives every migration after `s`
//! - A record at the latest step is returned unchanged
//! - A record at a step not in the list cannot be migrated
//!
//! Migration functions must be deterministic and side-effect free: the same
//! record may be migrated again after every conflicting write.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use strata_core::error::{Result, StrataError};
use strata_core::StoredRecord;
use thiserror::Error;

type MigrateFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// One named migration step
#[derive(Clone)]
pub struct Migration {
    step: String,
    migrate: MigrateFn,
}

impl Migration {
    /// Create a migration that advances records to `step`
    pub fn new<F>(step: impl Into<String>, migrate: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            step: step.into(),
            migrate: Arc::new(migrate),
        }
    }

    /// Step this migration advances to
    pub fn step(&self) -> &str {
        &self.step
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("step", &self.step).finish()
    }
}

/// Migration failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// The record's step is not part of the pipeline
    #[error("unknown migration step '{0}'")]
    UnknownStep(String),
}

/// Ordered migration steps for one store
#[derive(Debug, Clone, Default)]
pub struct MigrationPipeline {
    migrations: Vec<Migration>,
}

impl MigrationPipeline {
    /// Build a pipeline, validating step names
    pub fn new(migrations: Vec<Migration>) -> Result<Self> {
        let mut seen = HashSet::new();
        for migration in &migrations {
            if migration.step.is_empty() {
                return Err(StrataError::InvalidConfig(
                    "migration step names must not be empty".to_string(),
                ));
            }
            if !seen.insert(migration.step.as_str()) {
                return Err(StrataError::InvalidConfig(format!(
                    "duplicate migration step '{}'",
                    migration.step
                )));
            }
        }
        Ok(Self { migrations })
    }

    /// Step that fully migrated records carry ("" if there are no migrations)
    pub fn latest_step(&self) -> &str {
        self.migrations.last().map(|m| m.step.as_str()).unwrap_or("")
    }

    /// Number of migrations
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether there are no migrations
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Index of the first migration a record at `step` still needs
    fn start_for(&self, step: &str) -> std::result::Result<usize, MigrationError> {
        if step.is_empty() {
            return Ok(0);
        }
        self.migrations
            .iter()
            .position(|m| m.step == step)
            .map(|i| i + 1)
            .ok_or_else(|| MigrationError::UnknownStep(step.to_string()))
    }

    /// Number of migrations a record at `step` still needs
    pub fn pending(&self, step: &str) -> std::result::Result<usize, MigrationError> {
        Ok(self.migrations.len() - self.start_for(step)?)
    }

    /// Migrate a record to the latest step
    pub fn apply(&self, mut record: StoredRecord) -> std::result::Result<StoredRecord, MigrationError> {
        let start = self.start_for(&record.step)?;
        if start == self.migrations.len() {
            return Ok(record);
        }

        let mut value = record.value;
        for migration in &self.migrations[start..] {
            value = (migration.migrate)(value);
        }
        record.value = value;
        record.step = self.latest_step().to_string();
        Ok(record)
    }
}
