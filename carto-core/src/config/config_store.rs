//! Reloadable configuration value.
//!
//! Work that must see a consistent value for its whole lifetime (a
//! subscriber session, for instance) copies it once with
//! [`ConfigStore::snapshot`]; a reload only affects work started after it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// A shared configuration value that can be swapped at runtime.
///
/// Clones share the same value.
pub struct ConfigStore<T> {
    inner: Arc<Shared<T>>,
}

struct Shared<T> {
    value: watch::Sender<T>,
    reloads: AtomicU64,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Shared {
                value: watch::Sender::new(initial),
                reloads: AtomicU64::new(0),
            }),
        }
    }

    /// Swap in a new value.
    pub fn update(&self, value: T) {
        self.inner.value.send_replace(value);
        self.inner.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of updates applied since creation.
    pub fn version(&self) -> u64 {
        self.inner.reloads.load(Ordering::Relaxed)
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Copy of the current value.
    pub fn snapshot(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
