//! Time-bounded set membership for deduplication.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default interval between sweeper runs.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// A concurrent set of short strings with per-entry expiration.
///
/// `exists` consults the entry deadline, so an expired key reads as absent
/// even before the sweeper visits it; the sweeper only bounds memory.
pub struct HashHistory {
    name: String,
    entries: DashMap<String, Instant>,
    cleanup_interval: Duration,
}

impl HashHistory {
    pub fn new(name: impl Into<String>, cleanup_interval: Duration) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            cleanup_interval,
        }
    }

    /// Record `key` as seen for the next `ttl`.
    pub fn add(&self, key: impl Into<String>, ttl: Duration) {
        self.entries.insert(key.into(), Instant::now() + ttl);
    }

    /// True iff `key` was added with a TTL that has not yet elapsed.
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(deadline) => *deadline > Instant::now(),
            None => false,
        }
    }

    /// Drop expired entries; returns how many were removed.
    pub fn clean(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, deadline| *deadline > now);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(history = %self.name, removed, "Swept expired entries");
        }
        removed
    }

    /// Number of entries currently held (including not-yet-swept expired ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the background sweeper for this history. The task runs until
    /// the history is otherwise dropped by every holder.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let history = Arc::clone(self);
        let interval = history.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                history.clean();
            }
        })
    }
}
