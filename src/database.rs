//! Main entry point for Strata sessions.
//!
//! This module provides the `Strata` struct, which opens stores and runs
//! transactions across their sessions.

use crate::error::{Error, Result};
use std::sync::Arc;
use strata_concurrency::{RetryConfig, Transaction};
use strata_core::traits::{Backend, Data};
use strata_engine::{Store, StoreConfig};
use tokio::runtime::Handle;

/// A Strata session database.
///
/// Create one with [`Strata::ephemeral`] or [`Strata::builder`].
///
/// # Example
///
/// ```ignore
/// use strata_session::prelude::*;
///
/// let db = Strata::ephemeral()?;
/// let wallets = db.store(StoreConfig::new("wallets", || Wallet { coins: 0 }))?;
/// let add = wallets.action(|mut w: Wallet, n: &i64| {
///     w.coins += n;
///     Ok(w)
/// });
///
/// let alice = wallets.load("alice");
/// alice.wait().await?;
/// alice.patch(&add, 5)?;
/// alice.stop();
/// alice.wait().await?;
/// ```
#[derive(Clone)]
pub struct Strata {
    /// The underlying engine database
    pub(crate) inner: Arc<strata_engine::Database>,
}

impl Strata {
    /// Create a database over a fresh in-memory backend.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ephemeral() -> Result<Self> {
        Self::builder().open()
    }

    /// Create a builder for database configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = Strata::builder()
    ///     .backend(backend)
    ///     .strict(true)
    ///     .open()?;
    /// ```
    pub fn builder() -> StrataBuilder {
        StrataBuilder::new()
    }

    /// Create a typed store.
    pub fn store<T: Data>(&self, config: StoreConfig<T>) -> Result<Store<T>> {
        self.inner.store(config).map_err(Error::from)
    }

    /// Whether strict mode is on.
    pub fn strict(&self) -> bool {
        self.inner.strict()
    }

    /// Turn strict mode on or off, returning the previous setting.
    pub fn set_strict(&self, enabled: bool) -> bool {
        self.inner.set_strict(enabled)
    }

    /// Backend shared by every store.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.inner.backend()
    }

    /// Queue transactional actions and commit them atomically.
    ///
    /// Returns false if anything failed; no session was changed then.
    pub async fn transaction<'a, S>(&self, success: S) -> bool
    where
        S: FnOnce(&mut Transaction<'a>) -> strata_core::Result<()>,
    {
        self.inner.transaction(success).await
    }

    /// Like [`Strata::transaction`], running `failure` on abort.
    pub async fn transaction_with_failure<'a, S, F>(&self, success: S, failure: F) -> bool
    where
        S: FnOnce(&mut Transaction<'a>) -> strata_core::Result<()>,
        F: FnOnce(&Error),
    {
        self.inner
            .transaction_with_failure(success, |e| failure(&Error::from(e.clone())))
            .await
    }

    /// Database metrics.
    pub fn metrics(&self) -> DatabaseMetrics {
        let txn = self.inner.metrics();
        let operations = txn.total_committed + txn.total_aborted;
        DatabaseMetrics {
            transactions_committed: txn.total_committed,
            transactions_aborted: txn.total_aborted,
            commit_rate: if operations == 0 {
                1.0
            } else {
                txn.total_committed as f64 / operations as f64
            },
            operations,
        }
    }
}

impl std::fmt::Debug for Strata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strata").field("inner", &self.inner).finish()
    }
}

/// Database metrics.
#[derive(Debug, Clone)]
pub struct DatabaseMetrics {
    /// Total committed transactions
    pub transactions_committed: u64,
    /// Total aborted transactions
    pub transactions_aborted: u64,
    /// Commit success rate (0.0 - 1.0)
    pub commit_rate: f64,
    /// Total transactions (commits + aborts)
    pub operations: u64,
}

/// Builder for database configuration.
///
/// # Example
///
/// ```ignore
/// // Shared remote backend, explicit policy
/// let db = Strata::builder()
///     .backend(backend)
///     .retry(RetryConfig::default().with_max_retries(5))
///     .open()?;
///
/// // Unit testing: in-memory backend
/// let db = Strata::ephemeral()?;
/// ```
pub struct StrataBuilder {
    inner: strata_engine::DatabaseBuilder,
}

impl StrataBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            inner: strata_engine::DatabaseBuilder::new(),
        }
    }

    /// Backend for every store (defaults to an in-memory backend).
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.inner = self.inner.backend(backend);
        self
    }

    /// Turn strict mode on or off (defaults to on in debug builds).
    pub fn strict(mut self, enabled: bool) -> Self {
        self.inner = self.inner.strict(enabled);
        self
    }

    /// Default retry policy for stores.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.inner = self.inner.retry(retry);
        self
    }

    /// Runtime that runs loads and autosaves.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.inner = self.inner.runtime(runtime);
        self
    }

    /// Open the database.
    pub fn open(self) -> Result<Strata> {
        let db = Arc::new(self.inner.open().map_err(Error::from)?);
        Ok(Strata { inner: db })
    }
}

impl Default for StrataBuilder {
    fn default() -> Self {
        Self::new()
    }
}
