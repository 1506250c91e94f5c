//! Strict mode
//!
//! Strict mode enables two runtime defenses for the replay protocol:
//!
//! 1. **Purity check**: an action is run twice on independent copies of the
//!    input; differing outputs mean the action depends on hidden state.
//! 2. **Serializability check**: the result must survive a JSON round trip
//!    unchanged, otherwise it cannot be stored faithfully.
//!
//! The flag is process-wide configuration owned by the database and handed
//! to the patch, transaction and replay paths explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared strict-mode flag
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct StrictMode {
    enabled: Arc<AtomicBool>,
}

impl StrictMode {
    /// Create a flag with an explicit initial state
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// Default for the build profile
    ///
    /// Enabled in debug builds (development), disabled in release builds.
    pub fn for_build() -> Self {
        Self::new(cfg!(debug_assertions))
    }

    /// Whether checks are enabled
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable checks, returning the previous state
    pub fn set(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::AcqRel)
    }
}

impl Default for StrictMode {
    fn default() -> Self {
        Self::for_build()
    }
}
