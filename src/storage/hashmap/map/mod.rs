use std::sync::Arc;

use super::node::{NodeKind, NodeRef, TreeNode};
use crate::primitives::store::{ObjectStore, Persistable};
use crate::storage::{default_metrics, MapMetrics, MapOptions, MAX_DEPTH};
use crate::types::{MapError, ObjectId, ObjectRef, Result};

mod api;
mod maintenance;

/// Bound on directory hops during a lookup; a longer walk means a cycle.
const MAX_HOPS: u32 = MAX_DEPTH + 1;

/// A hash map stored as a prefix tree of objects inside an [`ObjectStore`].
///
/// The map value itself is only a handle: the root node handle, the options
/// and a metrics sink. Every node, and every wrapper the map creates for
/// inline keys and values, lives in the store, so any number of map handles
/// opened on the same root observe the same contents.
///
/// Leaves are addressed by hash prefix and split or merge independently, so
/// writers touching different prefixes modify disjoint store objects. The
/// root is only written when it is itself the leaf being modified.
pub struct ScalableHashMap<K, V> {
    root: NodeRef<K, V>,
    options: MapOptions,
    metrics: Arc<dyn MapMetrics>,
}

impl<K, V> Clone for ScalableHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root,
            options: self.options,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<K, V> std::fmt::Debug for ScalableHashMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalableHashMap")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

impl<K, V> ScalableHashMap<K, V>
where
    K: Persistable,
    V: Persistable,
{
    /// Creates an empty map in `store`.
    ///
    /// The options are validated before anything is written. The fresh map
    /// is seeded down to the depth that yields at least
    /// `options.min_concurrency` leaves.
    pub fn create<S: ObjectStore>(store: &mut S, options: MapOptions) -> Result<Self> {
        options.validate()?;
        let root = store.create_reference(TreeNode::leaf(0, None, options.leaf_capacity));
        let map = Self {
            root,
            options,
            metrics: default_metrics(),
        };
        map.seed(store)?;
        tracing::debug!(
            target: "scalable_map::create",
            root = root.id().0,
            min_depth = options.min_depth(),
            "created map"
        );
        Ok(map)
    }

    /// Opens a map previously created in `store` whose root is `root`.
    pub fn open<S: ObjectStore>(store: &S, root: ObjectId, options: MapOptions) -> Result<Self> {
        options.validate()?;
        let root: NodeRef<K, V> = ObjectRef::from_id(root);
        let node = store.resolve(root)?;
        if node.depth != 0 || node.parent.is_some() {
            return Err(MapError::InvalidState("object is not the root of a map"));
        }
        Ok(Self {
            root,
            options,
            metrics: default_metrics(),
        })
    }

    /// Routes structural events to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn MapMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Identifier of the root node; pass it to [`ScalableHashMap::open`].
    pub fn root_id(&self) -> ObjectId {
        self.root.id()
    }

    /// The options this map was created or opened with.
    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub(crate) fn root(&self) -> NodeRef<K, V> {
        self.root
    }

    /// Widest directory that can sit at `depth`.
    pub(crate) fn max_width(&self, depth: u32) -> u32 {
        self.options.dir_bits().min(MAX_DEPTH - depth)
    }

    /// Walks from the root to the leaf whose prefix covers `hash`.
    pub(crate) fn lookup<S: ObjectStore>(&self, store: &S, hash: u32) -> Result<NodeRef<K, V>> {
        let mut current = self.root;
        for _ in 0..MAX_HOPS {
            let node = store.resolve(current)?;
            match &node.kind {
                NodeKind::Leaf(_) => return Ok(current),
                NodeKind::Directory(dir) => current = dir.child(node.depth, hash),
            }
        }
        Err(MapError::Corruption("directory walk did not reach a leaf"))
    }

    /// The leaf covering hash zero, where the leaf chain starts.
    pub(crate) fn leftmost<S: ObjectStore>(&self, store: &S) -> Result<NodeRef<K, V>> {
        self.lookup(store, 0)
    }
}
