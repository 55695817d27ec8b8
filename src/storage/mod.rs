//! Map storage engine built on top of the object store primitives.
//!
//! Implements the prefix-sharded hash map together with its configuration
//! and structural metrics hooks.

/// Prefix-sharded hash map.
///
/// Nodes, bucket tables and entry wrappers all live in the object store.
pub mod hashmap;

mod metrics;
mod options;

/// Main map interface.
pub use hashmap::{
    Iter, Keys, MapCursor, MapStats, ScalableHashMap, Stored, Values, VerifyFinding,
    VerifyReport, VerifySeverity,
};

/// Metrics hooks for structural events.
pub use metrics::{default_metrics, CounterMetrics, MapMetrics, NoopMetrics};

/// Map configuration options.
pub use options::{
    MapOptions, DEFAULT_DIRECTORY_SIZE, DEFAULT_LEAF_CAPACITY, DEFAULT_MERGE_THRESHOLD,
    DEFAULT_MIN_CONCURRENCY, DEFAULT_SPLIT_THRESHOLD, MAX_DEPTH, MAX_MIN_DEPTH,
};
