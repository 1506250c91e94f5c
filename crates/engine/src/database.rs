//! Database: the engine entry point
//!
//! A [`Database`] binds a backend, a retry policy and the strict mode switch,
//! and hands out typed [`Store`]s. It also owns the transaction coordinator.
//!
//! # Example
//!
//! ```ignore
//! use strata_engine::{Database, StoreConfig};
//!
//! // In-memory backend, for tests
//! let db = Database::ephemeral()?;
//!
//! // Explicit backend and policy
//! let db = Database::builder()
//!     .backend(backend)
//!     .strict(true)
//!     .retry(RetryConfig::default().with_max_retries(5))
//!     .open()?;
//!
//! let wallets = db.store(StoreConfig::new("wallets", Wallet::default))?;
//! ```

use crate::config::StoreConfig;
use crate::migration::MigrationPipeline;
use crate::monitor::BadDataMonitor;
use crate::store::{Store, StoreInner};
use std::sync::Arc;
use strata_concurrency::{RetryConfig, Transaction, TransactionCoordinator, TransactionMetrics};
use strata_core::error::{Result, StrataError};
use strata_core::traits::{Backend, Data};
use strata_core::StrictMode;
use strata_storage::MemoryBackend;
use tokio::runtime::Handle;

/// Engine database handle
pub struct Database {
    backend: Arc<dyn Backend>,
    strict: StrictMode,
    retry: RetryConfig,
    runtime: Handle,
    coordinator: TransactionCoordinator,
}

impl Database {
    /// Database over a fresh in-memory backend
    ///
    /// Must be called from within a tokio runtime.
    pub fn ephemeral() -> Result<Self> {
        Self::builder().open()
    }

    /// Create a builder for database configuration
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Create a store from its configuration
    ///
    /// Fails with `InvalidConfig` on an empty name or scope, or on invalid
    /// migration steps.
    pub fn store<T: Data>(&self, config: StoreConfig<T>) -> Result<Store<T>> {
        if config.name.is_empty() {
            return Err(StrataError::InvalidConfig(
                "store name must not be empty".to_string(),
            ));
        }
        if config.scope.is_empty() {
            return Err(StrataError::InvalidConfig(format!(
                "store '{}' has an empty scope",
                config.name
            )));
        }
        let pipeline = MigrationPipeline::new(config.migrations)?;
        tracing::debug!(
            store = %config.name,
            scope = %config.scope,
            migrations = pipeline.len(),
            "store created"
        );

        Ok(Store::from_inner(StoreInner {
            name: config.name,
            scope: config.scope,
            registry: Default::default(),
            monitor: BadDataMonitor::new(pipeline, config.schema),
            default_data: config.default_data,
            autosave_delay: config.autosave_delay,
            retry: config.retry.unwrap_or_else(|| self.retry.clone()),
            backend: Arc::clone(&self.backend),
            strict: self.strict.clone(),
            runtime: self.runtime.clone(),
        }))
    }

    /// Whether strict mode is on
    pub fn strict(&self) -> bool {
        self.strict.enabled()
    }

    /// Turn strict mode on or off for every store of this database
    ///
    /// Returns the previous setting.
    pub fn set_strict(&self, enabled: bool) -> bool {
        self.strict.set(enabled)
    }

    /// Default retry policy of new stores
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Backend shared by every store
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Queue transactional actions with `success` and commit them atomically
    ///
    /// Returns false if queueing or validation failed; nothing was applied
    /// in that case.
    pub async fn transaction<'a, S>(&self, success: S) -> bool
    where
        S: FnOnce(&mut Transaction<'a>) -> Result<()>,
    {
        self.transaction_with_failure(success, |_| {}).await
    }

    /// Like [`Database::transaction`], running `failure` on abort
    pub async fn transaction_with_failure<'a, S, F>(&self, success: S, failure: F) -> bool
    where
        S: FnOnce(&mut Transaction<'a>) -> Result<()>,
        F: FnOnce(&StrataError),
    {
        match self.coordinator.run(self.strict.enabled(), success).await {
            Ok(_) => true,
            Err(e) => {
                failure(&e);
                false
            }
        }
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("strict", &self.strict.enabled())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for [`Database`]
#[derive(Default)]
pub struct DatabaseBuilder {
    backend: Option<Arc<dyn Backend>>,
    strict: Option<bool>,
    retry: Option<RetryConfig>,
    runtime: Option<Handle>,
}

impl DatabaseBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend for every store (defaults to a fresh [`MemoryBackend`])
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Strict mode (defaults to on in debug builds, off in release builds)
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = Some(enabled);
        self
    }

    /// Default retry policy for stores
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Runtime that runs loads and autosaves
    ///
    /// Defaults to the runtime `open` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Open the database
    pub fn open(self) -> Result<Database> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                StrataError::InvalidConfig(
                    "no tokio runtime: open inside a runtime or pass a handle".to_string(),
                )
            })?,
        };
        let strict = match self.strict {
            Some(enabled) => StrictMode::new(enabled),
            None => StrictMode::for_build(),
        };
        Ok(Database {
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(MemoryBackend::new())),
            strict,
            retry: self.retry.unwrap_or_default(),
            runtime,
            coordinator: TransactionCoordinator::new(),
        })
    }
}
