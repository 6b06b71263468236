//! Named mutexes serializing operations that share remote state.
//!
//! Remote APIs often refuse concurrent mutations of sibling resources (a
//! firewall and its rules, a queue and its bindings). Operations declare a
//! mutex precheck with an agreed key; the registry makes sure only one
//! holder per key runs at a time, process-wide when the global registry is
//! used.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{EngineError, Result};

/// How long to wait between acquisition attempts on a contended key.
const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// A registry of named mutexes. Entries are created on first use and live
/// for the registry's lifetime.
#[derive(Debug, Default)]
pub struct MutexRegistry {
    entries: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    held: parking_lot::Mutex<HashMap<String, OwnedMutexGuard<()>>>,
}

impl MutexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry. Engines sharing it serialize against
    /// each other, which is what mutex keys are for.
    pub fn global() -> Arc<MutexRegistry> {
        static GLOBAL: OnceLock<Arc<MutexRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(MutexRegistry::new())))
    }

    /// Acquires the named mutex, waiting for the current holder when the
    /// key is contended. Returns `cancelled` when the token fires first.
    pub async fn lock(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        let entry = self.entry(key);
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match Arc::clone(&entry).try_lock_owned() {
                Ok(guard) => {
                    self.held.lock().insert(key.to_string(), guard);
                    trace!(key = %key, "acquired named mutex");
                    return Ok(());
                }
                Err(_) => {
                    tokio::select! {
                        () = cancel.cancelled() => return Err(EngineError::Cancelled),
                        () = tokio::time::sleep(ACQUIRE_RETRY_INTERVAL) => {}
                    }
                }
            }
        }
    }

    /// Releases the named mutex when this registry holds it. Releasing a
    /// key that is not held is a no-op.
    pub fn unlock(&self, key: &str) {
        if self.held.lock().remove(key).is_some() {
            trace!(key = %key, "released named mutex");
        }
    }

    fn entry(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut entries = self.entries.lock();
        Arc::clone(entries.entry(key.to_string()).or_default())
    }
}

/// RAII over the mutex keys one operation's prechecks acquired. Dropping
/// the lease releases every key, on success and error paths alike.
#[derive(Debug)]
pub struct MutexLease {
    registry: Arc<MutexRegistry>,
    keys: Vec<String>,
}

impl MutexLease {
    pub(crate) fn new(registry: Arc<MutexRegistry>) -> Self {
        Self {
            registry,
            keys: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, key: String) {
        self.keys.push(key);
    }

    /// The keys this lease holds, in acquisition order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for MutexLease {
    fn drop(&mut self) {
        for key in &self.keys {
            self.registry.unlock(key);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
