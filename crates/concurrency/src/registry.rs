//! Action registry
//!
//! Maps stable action identities to type-erased transform functions.
//!
//! ## Purity Requirement
//!
//! Actions may run many times: once when patched, again on every replay
//! after a write conflict, and twice per run in strict mode. Actions MUST be
//! pure functions:
//! - Result depends only on the old value and the parameters
//! - No I/O, no external mutation, no reads of other sessions
//! - Same input always produces the same output
//!
//! ## Normal vs transactional actions
//!
//! Normal actions are anonymous and applied immediately by `patch`.
//! Transactional actions carry a name that is unique within the store and
//! can only be queued inside a transaction.

use crate::log::{ActionKey, PendingAction};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::error::{Result, StrataError};
use strata_core::traits::Data;

/// Rejection returned by an action function
///
/// A rejected action leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    reason: String,
}

impl Rejected {
    /// Reject with a reason
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The rejection reason
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Return type of action functions
pub type ActionResult<T> = std::result::Result<T, Rejected>;

type Invoker<T> = Arc<dyn Fn(T, &serde_json::Value) -> Result<T> + Send + Sync>;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Typed handle to a registered action
///
/// Handles are bound to the registry (store) that issued them.
pub struct Action<T, P> {
    key: ActionKey,
    registry_id: u64,
    _marker: PhantomData<fn(T, P) -> T>,
}

impl<T, P> Action<T, P> {
    /// Identity of the action
    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    /// Whether the action may only be used inside a transaction
    pub fn is_transactional(&self) -> bool {
        self.key.is_transaction()
    }
}

impl<T, P> Clone for Action<T, P> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            registry_id: self.registry_id,
            _marker: PhantomData,
        }
    }
}

impl<T, P> std::fmt::Debug for Action<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("key", &self.key)
            .field("registry_id", &self.registry_id)
            .finish()
    }
}

/// Registry of actions for one store
///
/// Append-only: actions are never removed. Lookups of unregistered keys
/// fail with [`StrataError::ActionNotFound`].
pub struct ActionRegistry<T> {
    id: u64,
    next_normal: AtomicU64,
    actions: RwLock<FxHashMap<ActionKey, Invoker<T>>>,
}

impl<T: Data> ActionRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            next_normal: AtomicU64::new(1),
            actions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register an anonymous action applied immediately by `patch`
    pub fn register_normal<P, F>(&self, f: F) -> Action<T, P>
    where
        P: Serialize + DeserializeOwned + 'static,
        F: Fn(T, &P) -> ActionResult<T> + Send + Sync + 'static,
    {
        let key = ActionKey::Normal(self.next_normal.fetch_add(1, Ordering::Relaxed));
        self.actions
            .write()
            .insert(key.clone(), Self::erase(key.clone(), f));
        self.handle(key)
    }

    /// Register a named action usable only inside transactions
    ///
    /// Fails with [`StrataError::DuplicateAction`] if the name is taken; the
    /// registry is left unchanged in that case.
    pub fn register_transaction<P, F>(&self, name: &str, f: F) -> Result<Action<T, P>>
    where
        P: Serialize + DeserializeOwned + 'static,
        F: Fn(T, &P) -> ActionResult<T> + Send + Sync + 'static,
    {
        let key = ActionKey::Transaction(name.to_string());
        let mut actions = self.actions.write();
        if actions.contains_key(&key) {
            return Err(StrataError::DuplicateAction {
                name: name.to_string(),
            });
        }
        actions.insert(key.clone(), Self::erase(key.clone(), f));
        Ok(self.handle(key))
    }

    /// Whether an action is registered
    pub fn contains(&self, key: &ActionKey) -> bool {
        self.actions.read().contains_key(key)
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    /// Whether no action is registered
    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }

    /// Encode a typed call into a pending action
    ///
    /// Fails with `ActionNotFound` if the handle came from another registry.
    pub fn prepare<P: Serialize>(&self, action: &Action<T, P>, params: &P) -> Result<PendingAction> {
        if action.registry_id != self.id || !self.contains(&action.key) {
            return Err(StrataError::ActionNotFound {
                action: action.key.to_string(),
            });
        }
        let params = serde_json::to_value(params)?;
        Ok(PendingAction {
            action: action.key.clone(),
            params,
        })
    }

    /// Run a registered action against a value
    ///
    /// With `strict` set, the action is run a second time on an independent
    /// copy of the input and its output must match, and the output must
    /// survive a JSON round trip.
    pub fn invoke(
        &self,
        key: &ActionKey,
        value: &T,
        params: &serde_json::Value,
        strict: bool,
    ) -> Result<T> {
        let invoker = self
            .actions
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StrataError::ActionNotFound {
                action: key.to_string(),
            })?;

        let output = invoker(value.clone(), params)?;
        if strict {
            Self::check_strict(key, &invoker, value, params, &output)?;
        }
        Ok(output)
    }

    fn check_strict(
        key: &ActionKey,
        invoker: &Invoker<T>,
        value: &T,
        params: &serde_json::Value,
        output: &T,
    ) -> Result<()> {
        let again = invoker(value.clone(), params)?;
        if &again != output {
            return Err(StrataError::StrictViolation {
                action: key.to_string(),
                reason: "produced different results for the same input".to_string(),
            });
        }

        let encoded = serde_json::to_value(output).map_err(|e| StrataError::StrictViolation {
            action: key.to_string(),
            reason: format!("result is not encodable: {}", e),
        })?;
        let decoded: T = serde_json::from_value(encoded).map_err(|e| {
            StrataError::StrictViolation {
                action: key.to_string(),
                reason: format!("result does not decode: {}", e),
            }
        })?;
        if &decoded != output {
            return Err(StrataError::StrictViolation {
                action: key.to_string(),
                reason: "result changes across a JSON round trip".to_string(),
            });
        }
        Ok(())
    }

    fn erase<P, F>(key: ActionKey, f: F) -> Invoker<T>
    where
        P: DeserializeOwned + 'static,
        F: Fn(T, &P) -> ActionResult<T> + Send + Sync + 'static,
    {
        Arc::new(move |value: T, params: &serde_json::Value| {
            let params: P = P::deserialize(params)?;
            f(value, &params).map_err(|rejected| StrataError::ActionRejected {
                action: key.to_string(),
                reason: rejected.reason,
            })
        })
    }

    fn handle<P>(&self, key: ActionKey) -> Action<T, P> {
        Action {
            key,
            registry_id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Data> Default for ActionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
