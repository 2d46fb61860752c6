//! Cache version stamp for blanket read-cache invalidation.
//!
//! Read paths outside the assignment core embed the current stamp value in
//! their cache keys. Bumping the stamp after every committed mutation makes
//! every previously built key unreachable without tracking individual entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide monotonic counter, explicitly constructed and passed by
/// handle rather than reached through a global.
#[derive(Debug, Default)]
pub struct CacheVersionStamp {
    counter: AtomicU64,
}

impl CacheVersionStamp {
    /// Create a new stamp starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new stamp wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Atomically increment the stamp and return the new value.
    pub fn bump(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Read the current stamp value.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Render a cache key carrying the current stamp, e.g. `resources:v7`.
    pub fn key_for(&self, prefix: &str) -> String {
        format!("{prefix}:v{}", self.current())
    }
}
