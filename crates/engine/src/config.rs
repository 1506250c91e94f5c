//! Store configuration
//!
//! A [`StoreConfig`] describes one named store: where its records live, how
//! old records are migrated, what counts as valid data and how often sessions
//! sync with the backend.
//!
//! # Example
//!
//! ```ignore
//! let config = StoreConfig::new("wallets", || Wallet { coins: 0 })
//!     .migration("v1", add_coins)
//!     .schema(|v| v["coins"].is_i64())
//!     .autosave_delay(Duration::from_secs(5));
//! let wallets = db.store(config)?;
//! ```

use crate::migration::Migration;
use crate::monitor::Schema;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use strata_concurrency::RetryConfig;
use strata_core::types::DEFAULT_SCOPE;

/// Default time between background syncs
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(30);

/// Factory for the value of a key with no stored record
pub type DefaultData<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Configuration of one store
pub struct StoreConfig<T> {
    pub(crate) name: String,
    pub(crate) scope: String,
    pub(crate) default_data: DefaultData<T>,
    pub(crate) migrations: Vec<Migration>,
    pub(crate) schema: Option<Schema>,
    pub(crate) autosave_delay: Duration,
    pub(crate) retry: Option<RetryConfig>,
}

impl<T> StoreConfig<T> {
    /// Configure a store named `name` whose new keys start at `default_data()`
    pub fn new<F>(name: impl Into<String>, default_data: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: DEFAULT_SCOPE.to_string(),
            default_data: Arc::new(default_data),
            migrations: Vec::new(),
            schema: None,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
            retry: None,
        }
    }

    /// Namespace within the store (defaults to the global scope)
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Append a migration step
    pub fn migration<F>(mut self, step: impl Into<String>, migrate: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.migrations.push(Migration::new(step, migrate));
        self
    }

    /// Append several migration steps in order
    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations);
        self
    }

    /// Predicate every loaded value must satisfy after migration
    pub fn schema<F>(mut self, schema: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Time between background syncs
    pub fn autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    /// Override the database's retry policy for this store
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> std::fmt::Debug for StoreConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("migrations", &self.migrations)
            .field("schema", &self.schema.is_some())
            .field("autosave_delay", &self.autosave_delay)
            .field("retry", &self.retry)
            .finish()
    }
}
