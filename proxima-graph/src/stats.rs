//! Query and maintenance counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Which operation a similarity evaluation is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SimScope {
    Search,
    Add,
    Remove,
}

/// Counters accumulated by searches and online maintenance.
///
/// All counters are atomic so queries may run from worker threads; reads use
/// relaxed ordering because the values are advisory. Restart counters are
/// always charged to the search counters, even when the search runs inside
/// `fast_add`; similarity evaluations are charged to the operation that
/// requested them.
#[derive(Debug, Default)]
pub struct Stats {
    search_similarities: AtomicU64,
    search_restarts: AtomicU64,
    search_cross_partition_restarts: AtomicU64,
    add_similarities: AtomicU64,
    remove_similarities: AtomicU64,
}

impl Stats {
    /// Similarities evaluated by searches.
    pub fn search_similarities(&self) -> u64 {
        self.search_similarities.load(Ordering::Relaxed)
    }

    /// Hill-climb restarts across all searches.
    pub fn search_restarts(&self) -> u64 {
        self.search_restarts.load(Ordering::Relaxed)
    }

    /// Descents abandoned because a neighbor lived in another partition.
    pub fn search_cross_partition_restarts(&self) -> u64 {
        self.search_cross_partition_restarts.load(Ordering::Relaxed)
    }

    /// Similarities evaluated by `add` / `fast_add`.
    pub fn add_similarities(&self) -> u64 {
        self.add_similarities.load(Ordering::Relaxed)
    }

    /// Similarities evaluated by `fast_remove`.
    pub fn remove_similarities(&self) -> u64 {
        self.remove_similarities.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.search_similarities.store(0, Ordering::Relaxed);
        self.search_restarts.store(0, Ordering::Relaxed);
        self.search_cross_partition_restarts.store(0, Ordering::Relaxed);
        self.add_similarities.store(0, Ordering::Relaxed);
        self.remove_similarities.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_similarity(&self, scope: SimScope) {
        let counter = match scope {
            SimScope::Search => &self.search_similarities,
            SimScope::Add => &self.add_similarities,
            SimScope::Remove => &self.remove_similarities,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restart(&self) {
        self.search_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cross_partition_restart(&self) {
        self.search_cross_partition_restarts
            .fetch_add(1, Ordering::Relaxed);
    }
}
