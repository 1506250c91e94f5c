//! Stores
//!
//! A [`Store`] is a named, typed collection of records. It owns the action
//! registry and the bad data monitor shared by every session it loads.

use crate::config::DefaultData;
use crate::monitor::BadDataMonitor;
use crate::session::Session;
use crate::view::View;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use strata_concurrency::{Action, ActionRegistry, ActionResult, RetryConfig};
use strata_core::error::Result;
use strata_core::traits::{Backend, Data};
use strata_core::types::RecordKey;
use strata_core::StrictMode;
use tokio::runtime::Handle;

/// State shared by a store and all of its sessions and views
pub(crate) struct StoreInner<T> {
    pub(crate) name: String,
    pub(crate) scope: String,
    pub(crate) registry: ActionRegistry<T>,
    pub(crate) monitor: BadDataMonitor<T>,
    pub(crate) default_data: DefaultData<T>,
    pub(crate) autosave_delay: Duration,
    pub(crate) retry: RetryConfig,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) strict: StrictMode,
    pub(crate) runtime: Handle,
}

impl<T: Data> StoreInner<T> {
    pub(crate) fn key(&self, key: impl Into<String>) -> RecordKey {
        RecordKey::new(self.name.clone(), self.scope.clone(), key)
    }
}

/// Handle to a named store
///
/// Cloning is cheap; clones share registrations.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Data> Store<T> {
    pub(crate) fn from_inner(inner: StoreInner<T>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Store scope
    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    /// Full record key for `key` in this store
    pub fn key(&self, key: impl Into<String>) -> RecordKey {
        self.inner.key(key)
    }

    /// Register a normal action, applied immediately by [`Session::patch`]
    pub fn action<P, F>(&self, f: F) -> Action<T, P>
    where
        P: Serialize + DeserializeOwned + 'static,
        F: Fn(T, &P) -> ActionResult<T> + Send + Sync + 'static,
    {
        self.inner.registry.register_normal(f)
    }

    /// Register a named action usable only inside transactions
    pub fn transaction_action<P, F>(&self, name: &str, f: F) -> Result<Action<T, P>>
    where
        P: Serialize + DeserializeOwned + 'static,
        F: Fn(T, &P) -> ActionResult<T> + Send + Sync + 'static,
    {
        self.inner.registry.register_transaction(name, f)
    }

    /// Start loading `key` and return its session immediately
    ///
    /// Must be called from within the database's tokio runtime context or
    /// with a database opened over an explicit runtime handle.
    pub fn load(&self, key: impl Into<String>) -> Session<T> {
        self.load_with_users(key, std::iter::empty())
    }

    /// Start loading `key`, recording `user_ids` on every write
    pub fn load_with_users(
        &self,
        key: impl Into<String>,
        user_ids: impl IntoIterator<Item = u64>,
    ) -> Session<T> {
        let user_ids: BTreeSet<u64> = user_ids.into_iter().collect();
        let session = Session::new(Arc::clone(&self.inner), self.inner.key(key), user_ids);
        session.start();
        session
    }

    /// Read-only historical access to `key`
    pub fn view(&self, key: impl Into<String>) -> View<T> {
        View::new(Arc::clone(&self.inner), self.inner.key(key))
    }

    /// Step that records written by this store carry
    pub fn latest_step(&self) -> &str {
        self.inner.monitor.latest_step()
    }
}

impl<T> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("scope", &self.inner.scope)
            .finish()
    }
}
