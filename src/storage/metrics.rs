use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hooks for observing structural changes inside a map.
///
/// Implementations see every split, merge and directory collapse the map
/// performs, which is enough to watch how the tree reshapes itself under a
/// workload.
pub trait MapMetrics: Send + Sync {
    /// A leaf at `depth` split into two leaves at `depth + 1`.
    fn leaf_split(&self, depth: u32);

    /// Two sibling leaves at `depth` merged into one leaf at `depth - 1`.
    fn leaf_merge(&self, depth: u32);

    /// A directory at `depth` was folded back into a single leaf.
    fn directory_collapse(&self, depth: u32);

    /// A merge attempt was abandoned because its conditions did not hold.
    fn merge_aborted(&self);
}

/// A [`MapMetrics`] implementation that discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl MapMetrics for NoopMetrics {
    fn leaf_split(&self, _depth: u32) {}
    fn leaf_merge(&self, _depth: u32) {}
    fn directory_collapse(&self, _depth: u32) {}
    fn merge_aborted(&self) {}
}

/// Atomic counters for every [`MapMetrics`] event.
#[derive(Default)]
pub struct CounterMetrics {
    /// Leaf splits performed.
    pub splits: AtomicU64,

    /// Leaf merges performed.
    pub merges: AtomicU64,

    /// Directories collapsed into leaves.
    pub collapses: AtomicU64,

    /// Merge attempts abandoned.
    pub merges_aborted: AtomicU64,

    /// Deepest leaf created by a split.
    pub max_split_depth: AtomicU64,
}

impl CounterMetrics {
    /// Returns the number of splits recorded.
    pub fn splits(&self) -> u64 {
        self.splits.load(Ordering::Relaxed)
    }

    /// Returns the number of merges recorded.
    pub fn merges(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }

    /// Returns the number of directory collapses recorded.
    pub fn collapses(&self) -> u64 {
        self.collapses.load(Ordering::Relaxed)
    }

    /// Returns the number of abandoned merge attempts.
    pub fn merges_aborted(&self) -> u64 {
        self.merges_aborted.load(Ordering::Relaxed)
    }
}

impl MapMetrics for CounterMetrics {
    fn leaf_split(&self, depth: u32) {
        self.splits.fetch_add(1, Ordering::Relaxed);
        self.max_split_depth
            .fetch_max(u64::from(depth) + 1, Ordering::Relaxed);
    }

    fn leaf_merge(&self, _depth: u32) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    fn directory_collapse(&self, _depth: u32) {
        self.collapses.fetch_add(1, Ordering::Relaxed);
    }

    fn merge_aborted(&self) {
        self.merges_aborted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
pub fn default_metrics() -> Arc<dyn MapMetrics> {
    Arc::new(NoopMetrics)
}
