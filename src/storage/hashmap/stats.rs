//! Shape snapshots of a map, rendered as JSON or emitted through tracing.

use serde::Serialize;

use super::map::ScalableHashMap;
use super::node::NodeKind;
use crate::primitives::store::{ObjectStore, Persistable};
use crate::types::{MapError, Result};

/// Snapshot of a map's shape at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MapStats {
    /// Number of leaves in the leaf chain.
    pub leaves: u64,
    /// Number of directory nodes reachable from the root.
    pub directories: u64,
    /// Number of entries across all leaves.
    pub entries: u64,
    /// Depth of the shallowest leaf.
    pub min_leaf_depth: u32,
    /// Depth of the deepest leaf.
    pub max_leaf_depth: u32,
    /// Mean leaf depth.
    pub avg_leaf_depth: f64,
    /// Widest directory, in bits.
    pub max_directory_width: u32,
}

impl MapStats {
    /// Renders the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| MapError::Serialization(err.to_string()))
    }

    /// Emits the snapshot to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        tracing::info!(
            target: "scalable_map::stats",
            leaves = self.leaves,
            directories = self.directories,
            entries = self.entries,
            min_leaf_depth = self.min_leaf_depth,
            max_leaf_depth = self.max_leaf_depth,
            avg_leaf_depth = self.avg_leaf_depth,
            max_directory_width = self.max_directory_width,
            "map stats snapshot"
        );
    }
}

impl<K, V> ScalableHashMap<K, V>
where
    K: Persistable,
    V: Persistable,
{
    /// Walks the leaf chain and the directory tree to describe the map.
    pub fn stats<S: ObjectStore>(&self, store: &S) -> Result<MapStats> {
        let mut stats = MapStats {
            min_leaf_depth: u32::MAX,
            ..MapStats::default()
        };
        let mut depth_sum = 0u64;
        let mut next = Some(self.leftmost(store)?);
        while let Some(leaf_ref) = next {
            let node = store.resolve(leaf_ref)?;
            let leaf = node.as_leaf()?;
            stats.leaves += 1;
            stats.entries += u64::from(leaf.count);
            stats.min_leaf_depth = stats.min_leaf_depth.min(node.depth);
            stats.max_leaf_depth = stats.max_leaf_depth.max(node.depth);
            depth_sum += u64::from(node.depth);
            next = leaf.right;
        }
        if stats.leaves > 0 {
            stats.avg_leaf_depth = depth_sum as f64 / stats.leaves as f64;
        }

        let mut pending = vec![self.root()];
        while let Some(node_ref) = pending.pop() {
            if let NodeKind::Directory(dir) = &store.resolve(node_ref)?.kind {
                stats.directories += 1;
                stats.max_directory_width = stats.max_directory_width.max(dir.width);
                pending.extend(dir.distinct_children());
            }
        }
        Ok(stats)
    }
}
