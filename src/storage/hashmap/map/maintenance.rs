use super::ScalableHashMap;
use crate::primitives::store::{ObjectStore, Persistable};
use crate::storage::hashmap::entry::Stored;
use crate::storage::hashmap::hash::bit_at;
use crate::storage::hashmap::node::{Directory, Leaf, NodeKind, NodeRef, TreeNode};
use crate::storage::MAX_DEPTH;
use crate::types::{MapError, ObjectId, Result};

/// Two sibling leaves that passed every merge check.
struct MergePlan<K, V> {
    parent: NodeRef<K, V>,
    left: NodeRef<K, V>,
    right: NodeRef<K, V>,
    depth: u32,
}

impl<K, V> ScalableHashMap<K, V>
where
    K: Persistable,
    V: Persistable,
{
    /// Pre-splits every leaf shallower than the minimum depth and links the
    /// resulting leaves into one chain.
    pub(super) fn seed<S: ObjectStore>(&self, store: &mut S) -> Result<()> {
        let min_depth = self.options.min_depth();
        let capacity = self.options.leaf_capacity;
        let mut leaves = Vec::new();
        let mut pending = vec![self.root];
        while let Some(node_ref) = pending.pop() {
            let depth = store.resolve(node_ref)?.depth;
            if depth >= min_depth {
                leaves.push(node_ref);
                continue;
            }
            let width = (min_depth - depth).min(self.max_width(depth));
            let children: Vec<NodeRef<K, V>> = (0..1u32 << width)
                .map(|_| {
                    store.create_reference(TreeNode::leaf(depth + width, Some(node_ref), capacity))
                })
                .collect();
            // popped in reverse so leaves are collected left to right
            pending.extend(children.iter().rev().copied());
            store.resolve_for_update(node_ref)?.kind =
                NodeKind::Directory(Directory { width, children });
        }
        if leaves.len() > 1 {
            for (index, leaf_ref) in leaves.iter().enumerate() {
                let left = index.checked_sub(1).map(|prev| leaves[prev]);
                let right = leaves.get(index + 1).copied();
                let leaf = store.resolve_for_update(*leaf_ref)?.as_leaf_mut()?;
                leaf.left = left;
                leaf.right = right;
            }
        }
        Ok(())
    }

    /// Splits a full leaf into two leaves one bit deeper.
    ///
    /// Either the parent directory takes both halves in the old leaf's slots
    /// and the old leaf object is deleted, or the leaf object turns into a
    /// two-slot directory in place. Writes the leaf, its parent and its two
    /// chain neighbours at most.
    pub(super) fn split<S: ObjectStore>(&self, store: &mut S, leaf_ref: NodeRef<K, V>) -> Result<()> {
        let node = store.resolve(leaf_ref)?;
        if !node.is_leaf() || node.depth >= MAX_DEPTH {
            return Ok(());
        }
        let depth = node.depth;
        let absorbing = match node.parent {
            Some(parent) if depth != self.options.min_depth() => {
                let parent_depth = store.resolve(parent)?.depth;
                (depth + 1 - parent_depth <= self.max_width(parent_depth)).then_some(parent)
            }
            _ => None,
        };

        let (left, right, entries) = {
            let leaf = store.resolve_for_update(leaf_ref)?.as_leaf_mut()?;
            (leaf.left, leaf.right, leaf.drain_entries())
        };
        let capacity = self.options.leaf_capacity;
        let child_parent = Some(absorbing.unwrap_or(leaf_ref));
        let mut low = Leaf::new(capacity);
        let mut high = Leaf::new(capacity);
        for entry in entries {
            if bit_at(entry.hash, depth) {
                high.push_ordered(depth + 1, entry);
            } else {
                low.push_ordered(depth + 1, entry);
            }
        }
        let (low_count, high_count) = (low.count, high.count);
        low.left = left;
        high.right = right;
        let low_ref = store.create_reference(TreeNode {
            depth: depth + 1,
            parent: child_parent,
            kind: NodeKind::Leaf(low),
        });
        high.left = Some(low_ref);
        let high_ref = store.create_reference(TreeNode {
            depth: depth + 1,
            parent: child_parent,
            kind: NodeKind::Leaf(high),
        });
        store.resolve_for_update(low_ref)?.as_leaf_mut()?.right = Some(high_ref);
        if let Some(left) = left {
            store.resolve_for_update(left)?.as_leaf_mut()?.right = Some(low_ref);
        }
        if let Some(right) = right {
            store.resolve_for_update(right)?.as_leaf_mut()?.left = Some(high_ref);
        }

        match absorbing {
            None => {
                store.resolve_for_update(leaf_ref)?.kind =
                    NodeKind::Directory(Directory::pair(low_ref, high_ref));
            }
            Some(parent) => {
                let parent_node = store.resolve_for_update(parent)?;
                let parent_depth = parent_node.depth;
                let dir = parent_node.as_directory_mut()?;
                dir.widen(depth + 1 - parent_depth);
                let span = dir
                    .span_of(leaf_ref)
                    .ok_or(MapError::Corruption("split leaf missing from its parent"))?;
                let mid = span.start + span.len() / 2;
                for (index, slot) in dir.children[span.clone()].iter_mut().enumerate() {
                    *slot = if span.start + index < mid { low_ref } else { high_ref };
                }
                store.remove(leaf_ref)?;
            }
        }

        self.metrics.leaf_split(depth);
        tracing::debug!(
            target: "scalable_map::split",
            leaf = leaf_ref.id().0,
            depth,
            low = low_count,
            high = high_count,
            absorbed_by_parent = absorbing.is_some(),
            "split leaf"
        );
        Ok(())
    }

    /// Removes the entry with the given position, if it still exists.
    pub(crate) fn remove_entry<S: ObjectStore>(
        &self,
        store: &mut S,
        hash: u32,
        key_id: ObjectId,
    ) -> Result<Option<Stored<V>>> {
        let leaf_ref = self.lookup(store, hash)?;
        let found = {
            let node = store.resolve(leaf_ref)?;
            node.as_leaf()?.position_of(node.depth, hash, key_id)
        };
        match found {
            Some((bucket, pos)) => self.detach(store, leaf_ref, bucket, pos).map(Some),
            None => Ok(None),
        }
    }

    /// Takes an entry out of its leaf, releases it and attempts a merge.
    pub(super) fn detach<S: ObjectStore>(
        &self,
        store: &mut S,
        leaf_ref: NodeRef<K, V>,
        bucket: usize,
        pos: usize,
    ) -> Result<Stored<V>> {
        let (entry, count, depth) = {
            let node = store.resolve_for_update(leaf_ref)?;
            let depth = node.depth;
            let leaf = node.as_leaf_mut()?;
            let entry = leaf.remove_at(bucket, pos);
            (entry, leaf.count, depth)
        };
        let old = entry.release(store)?;
        if count <= self.options.merge_threshold && depth > self.options.min_depth() {
            self.try_merge(store, leaf_ref)?;
        }
        Ok(old)
    }

    fn try_merge<S: ObjectStore>(&self, store: &mut S, leaf_ref: NodeRef<K, V>) -> Result<()> {
        match self.plan_merge(store, leaf_ref)? {
            Some(plan) => self.apply_merge(store, plan),
            None => {
                self.metrics.merge_aborted();
                tracing::trace!(
                    target: "scalable_map::merge",
                    leaf = leaf_ref.id().0,
                    "merge conditions not met"
                );
                Ok(())
            }
        }
    }

    /// Finds the sibling that differs from `leaf_ref` only in its last
    /// prefix bit and checks that the pair may be folded together.
    fn plan_merge<S: ObjectStore>(
        &self,
        store: &S,
        leaf_ref: NodeRef<K, V>,
    ) -> Result<Option<MergePlan<K, V>>> {
        let node = store.resolve(leaf_ref)?;
        let depth = node.depth;
        let (Some(parent), NodeKind::Leaf(leaf)) = (node.parent, &node.kind) else {
            return Ok(None);
        };
        if depth <= self.options.min_depth() {
            return Ok(None);
        }
        let parent_node = store.resolve(parent)?;
        let dir = parent_node.as_directory()?;
        if depth <= parent_node.depth || depth - parent_node.depth > dir.width {
            return Err(MapError::Corruption("leaf depth outside its parent's range"));
        }
        let span = dir
            .span_of(leaf_ref)
            .ok_or(MapError::Corruption("leaf missing from its parent"))?;
        let len = span.len();
        let is_high = (span.start / len) % 2 == 1;
        let sibling = if is_high {
            dir.children[span.start - len]
        } else {
            dir.children[span.end]
        };

        let sibling_node = store.resolve(sibling)?;
        let NodeKind::Leaf(sibling_leaf) = &sibling_node.kind else {
            return Ok(None);
        };
        if sibling_node.depth != depth || sibling_node.parent != Some(parent) {
            return Ok(None);
        }
        let chained = if is_high { leaf.left } else { leaf.right };
        if chained != Some(sibling) {
            return Err(MapError::Corruption("leaf chain disagrees with directory"));
        }
        if sibling_leaf.count > self.options.merge_threshold
            || leaf.count + sibling_leaf.count >= self.options.split_threshold
        {
            return Ok(None);
        }
        let (left, right) = if is_high {
            (sibling, leaf_ref)
        } else {
            (leaf_ref, sibling)
        };
        Ok(Some(MergePlan {
            parent,
            left,
            right,
            depth,
        }))
    }

    /// Folds the right sibling into the left one, one bit shallower.
    fn apply_merge<S: ObjectStore>(&self, store: &mut S, plan: MergePlan<K, V>) -> Result<()> {
        let MergePlan {
            parent,
            left,
            right,
            depth,
        } = plan;
        let merged_depth = depth - 1;
        let NodeKind::Leaf(mut right_leaf) = store.remove(right)?.kind else {
            return Err(MapError::Corruption("merge sibling is not a leaf"));
        };
        let outer = right_leaf.right;
        let count = {
            let node = store.resolve_for_update(left)?;
            node.depth = merged_depth;
            let leaf = node.as_leaf_mut()?;
            let mut entries = leaf.drain_entries();
            entries.extend(right_leaf.drain_entries());
            for entry in entries {
                leaf.push_ordered(merged_depth, entry);
            }
            leaf.right = outer;
            leaf.count
        };
        if let Some(outer) = outer {
            store.resolve_for_update(outer)?.as_leaf_mut()?.left = Some(left);
        }

        let collapse = {
            let parent_node = store.resolve_for_update(parent)?;
            let spans_parent = parent_node.depth == merged_depth;
            let dir = parent_node.as_directory_mut()?;
            dir.replace(right, left);
            if !spans_parent {
                dir.narrow();
            }
            spans_parent
        };

        self.metrics.leaf_merge(depth);
        tracing::debug!(
            target: "scalable_map::merge",
            survivor = left.id().0,
            removed = right.id().0,
            depth = merged_depth,
            entries = count,
            "merged sibling leaves"
        );
        if collapse {
            self.collapse(store, parent, left)?;
        }
        Ok(())
    }

    /// Turns a directory whose only child is `child` back into that leaf.
    ///
    /// The directory object keeps its handle, so its own parent is not
    /// touched; the child object is deleted.
    fn collapse<S: ObjectStore>(
        &self,
        store: &mut S,
        dir_ref: NodeRef<K, V>,
        child: NodeRef<K, V>,
    ) -> Result<()> {
        let NodeKind::Leaf(leaf) = store.remove(child)?.kind else {
            return Err(MapError::Corruption("collapsed child is not a leaf"));
        };
        let (left, right) = (leaf.left, leaf.right);
        let node = store.resolve_for_update(dir_ref)?;
        let depth = node.depth;
        node.kind = NodeKind::Leaf(leaf);
        if let Some(left) = left {
            store.resolve_for_update(left)?.as_leaf_mut()?.right = Some(dir_ref);
        }
        if let Some(right) = right {
            store.resolve_for_update(right)?.as_leaf_mut()?.left = Some(dir_ref);
        }
        self.metrics.directory_collapse(depth);
        tracing::debug!(
            target: "scalable_map::collapse",
            node = dir_ref.id().0,
            depth,
            "collapsed directory into leaf"
        );
        Ok(())
    }

    /// Deletes every node below the root, and the root too when asked,
    /// releasing the wrappers of every entry. Returns the entries released.
    ///
    /// A kept root is left as an empty leaf.
    pub(super) fn release_tree<S: ObjectStore>(&self, store: &mut S, include_root: bool) -> Result<u64> {
        let mut released = 0u64;
        let mut pending = vec![self.root];
        while let Some(node_ref) = pending.pop() {
            let kind = if node_ref == self.root && !include_root {
                let empty = NodeKind::Leaf(Leaf::new(self.options.leaf_capacity));
                std::mem::replace(&mut store.resolve_for_update(node_ref)?.kind, empty)
            } else {
                store.remove(node_ref)?.kind
            };
            match kind {
                NodeKind::Leaf(mut leaf) => {
                    for entry in leaf.drain_entries() {
                        entry.discard(store)?;
                        released += 1;
                    }
                }
                NodeKind::Directory(dir) => pending.extend(dir.distinct_children()),
            }
        }
        Ok(released)
    }
}
