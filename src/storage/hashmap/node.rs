//! Tree nodes: leaves with bucket tables and directories with slot arrays.

use std::borrow::Borrow;
use std::ops::Range;

use smallvec::SmallVec;

use super::entry::PrefixEntry;
use super::hash::prefix_bits;
use crate::primitives::store::{ObjectStore, Persistable};
use crate::types::{MapError, ObjectId, ObjectRef, Result};

pub(crate) type NodeRef<K, V> = ObjectRef<TreeNode<K, V>>;

/// Entries sharing a bucket index, kept sorted by `(hash, key_id)`.
pub(crate) type Bucket<K, V> = SmallVec<[PrefixEntry<K, V>; 2]>;

/// A node of the prefix tree.
///
/// `depth` is the number of leading hash bits every hash routed to this node
/// shares. A node can change kind in place, which keeps its handle valid for
/// the parent that points at it.
pub(crate) struct TreeNode<K, V> {
    pub(crate) depth: u32,
    pub(crate) parent: Option<NodeRef<K, V>>,
    pub(crate) kind: NodeKind<K, V>,
}

pub(crate) enum NodeKind<K, V> {
    Leaf(Leaf<K, V>),
    Directory(Directory<K, V>),
}

impl<K, V> TreeNode<K, V> {
    pub(crate) fn leaf(depth: u32, parent: Option<NodeRef<K, V>>, capacity: u32) -> Self {
        TreeNode {
            depth,
            parent,
            kind: NodeKind::Leaf(Leaf::new(capacity)),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub(crate) fn as_leaf(&self) -> Result<&Leaf<K, V>> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Directory(_) => Err(MapError::Corruption("expected a leaf node")),
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> Result<&mut Leaf<K, V>> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Directory(_) => Err(MapError::Corruption("expected a leaf node")),
        }
    }

    pub(crate) fn as_directory(&self) -> Result<&Directory<K, V>> {
        match &self.kind {
            NodeKind::Directory(dir) => Ok(dir),
            NodeKind::Leaf(_) => Err(MapError::Corruption("expected a directory node")),
        }
    }

    pub(crate) fn as_directory_mut(&mut self) -> Result<&mut Directory<K, V>> {
        match &mut self.kind {
            NodeKind::Directory(dir) => Ok(dir),
            NodeKind::Leaf(_) => Err(MapError::Corruption("expected a directory node")),
        }
    }
}

/// A bucketed table of entries plus links to the neighbouring leaves.
///
/// The bucket index is taken from the hash bits right after the leaf's
/// depth, so bucket order follows hash order and a leaf can be walked in
/// `(hash, key_id)` order without sorting.
pub(crate) struct Leaf<K, V> {
    pub(crate) buckets: Vec<Bucket<K, V>>,
    pub(crate) count: u32,
    pub(crate) left: Option<NodeRef<K, V>>,
    pub(crate) right: Option<NodeRef<K, V>>,
}

impl<K, V> Leaf<K, V> {
    pub(crate) fn new(capacity: u32) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Leaf {
            buckets: (0..capacity).map(|_| SmallVec::new()).collect(),
            count: 0,
            left: None,
            right: None,
        }
    }

    fn index_bits(&self) -> u32 {
        self.buckets.len().trailing_zeros()
    }

    pub(crate) fn bucket_index(&self, depth: u32, hash: u32) -> usize {
        prefix_bits(hash, depth, self.index_bits()) as usize
    }

    /// Inserts `entry` at its sorted position.
    pub(crate) fn insert(&mut self, depth: u32, entry: PrefixEntry<K, V>) {
        let index = self.bucket_index(depth, entry.hash);
        let bucket = &mut self.buckets[index];
        let order = entry.order();
        let pos = bucket.partition_point(|e| e.order() < order);
        bucket.insert(pos, entry);
        self.count += 1;
    }

    /// Appends an entry that sorts after everything already in the leaf.
    pub(crate) fn push_ordered(&mut self, depth: u32, entry: PrefixEntry<K, V>) {
        let index = self.bucket_index(depth, entry.hash);
        debug_assert!(self.buckets[index]
            .last()
            .map_or(true, |last| last.order() < entry.order()));
        self.buckets[index].push(entry);
        self.count += 1;
    }

    pub(crate) fn remove_at(&mut self, bucket: usize, pos: usize) -> PrefixEntry<K, V> {
        self.count -= 1;
        self.buckets[bucket].remove(pos)
    }

    /// Every entry in `(hash, key_id)` order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &PrefixEntry<K, V>> + '_ {
        self.buckets.iter().flatten()
    }

    /// Empties the leaf, yielding its entries in order.
    pub(crate) fn drain_entries(&mut self) -> Vec<PrefixEntry<K, V>> {
        self.count = 0;
        self.buckets.iter_mut().flat_map(|b| b.drain(..)).collect()
    }

    /// First entry ordered strictly after `(hash, key_id)`, or the first
    /// entry of the leaf when no position is given.
    pub(crate) fn first_after(
        &self,
        depth: u32,
        after: Option<(u32, ObjectId)>,
    ) -> Option<PrefixEntry<K, V>> {
        match after {
            None => self.entries().next().copied(),
            Some(position) => {
                let start = self.bucket_index(depth, position.0);
                self.buckets[start..]
                    .iter()
                    .flatten()
                    .find(|e| e.order() > position)
                    .copied()
            }
        }
    }

    /// Locates an entry by hash and identity.
    pub(crate) fn position_of(&self, depth: u32, hash: u32, key_id: ObjectId) -> Option<(usize, usize)> {
        let bucket = self.bucket_index(depth, hash);
        self.buckets[bucket]
            .iter()
            .position(|e| e.hash == hash && e.key_id() == key_id)
            .map(|pos| (bucket, pos))
    }
}

impl<K: Persistable, V: Persistable> Leaf<K, V> {
    /// Locates the entry whose key equals `key`.
    ///
    /// Entries whose native key object has vanished never match.
    pub(crate) fn find<S, Q>(
        &self,
        store: &S,
        depth: u32,
        hash: u32,
        key: &Q,
    ) -> Result<Option<(usize, usize)>>
    where
        S: ObjectStore,
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let bucket = self.bucket_index(depth, hash);
        for (pos, entry) in self.buckets[bucket].iter().enumerate() {
            if entry.hash < hash {
                continue;
            }
            if entry.hash > hash {
                break;
            }
            if let Some(candidate) = entry.key_if_present(store)? {
                if <K as Borrow<Q>>::borrow(candidate) == key {
                    return Ok(Some((bucket, pos)));
                }
            }
        }
        Ok(None)
    }
}

/// A power-of-two slot array routing the next `width` hash bits.
///
/// A child at depth `c` under a directory at depth `d` occupies
/// `2^(width - (c - d))` consecutive, aligned slots.
pub(crate) struct Directory<K, V> {
    pub(crate) width: u32,
    pub(crate) children: Vec<NodeRef<K, V>>,
}

impl<K, V> Directory<K, V> {
    pub(crate) fn pair(low: NodeRef<K, V>, high: NodeRef<K, V>) -> Self {
        Directory {
            width: 1,
            children: vec![low, high],
        }
    }

    pub(crate) fn child(&self, depth: u32, hash: u32) -> NodeRef<K, V> {
        self.children[prefix_bits(hash, depth, self.width) as usize]
    }

    /// The slots pointing at `child`.
    pub(crate) fn span_of(&self, child: NodeRef<K, V>) -> Option<Range<usize>> {
        let start = self.children.iter().position(|c| *c == child)?;
        let len = self.children[start..]
            .iter()
            .take_while(|c| **c == child)
            .count();
        Some(start..start + len)
    }

    /// Doubles the slot array until it resolves `width` bits.
    pub(crate) fn widen(&mut self, width: u32) {
        if width <= self.width {
            return;
        }
        let factor = 1usize << (width - self.width);
        self.children = self
            .children
            .iter()
            .flat_map(|c| std::iter::repeat(*c).take(factor))
            .collect();
        self.width = width;
    }

    /// Halves the slot array while every aligned pair aliases one child.
    pub(crate) fn narrow(&mut self) -> bool {
        let mut narrowed = false;
        while self.width > 1 && self.children.chunks(2).all(|pair| pair[0] == pair[1]) {
            self.children = self.children.iter().step_by(2).copied().collect();
            self.width -= 1;
            narrowed = true;
        }
        narrowed
    }

    pub(crate) fn replace(&mut self, old: NodeRef<K, V>, new: NodeRef<K, V>) {
        for slot in self.children.iter_mut().filter(|slot| **slot == old) {
            *slot = new;
        }
    }

    /// Each child once, in slot order.
    pub(crate) fn distinct_children(&self) -> Vec<NodeRef<K, V>> {
        let mut children = self.children.clone();
        children.dedup();
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hashmap::entry::EntryShape;

    type Node = TreeNode<String, String>;

    fn entry(hash: u32, id: u64) -> PrefixEntry<String, String> {
        PrefixEntry {
            hash,
            shape: EntryShape::Combined {
                pair: ObjectRef::from_id(ObjectId(id)),
            },
        }
    }

    fn node(id: u64) -> NodeRef<String, String> {
        ObjectRef::from_id(ObjectId(id))
    }

    #[test]
    fn leaf_keeps_entries_in_hash_order() {
        let mut leaf = Leaf::new(4);
        for (hash, id) in [(0xF000_0000, 1), (0x1000_0000, 2), (0x1000_0000, 1), (0x8000_0000, 3)] {
            leaf.insert(0, entry(hash, id));
        }
        let order: Vec<_> = leaf.entries().map(|e| (e.hash, e.key_id().0)).collect();
        assert_eq!(
            order,
            vec![(0x1000_0000, 1), (0x1000_0000, 2), (0x8000_0000, 3), (0xF000_0000, 1)]
        );
        assert_eq!(leaf.count, 4);
        let next = leaf.first_after(0, Some((0x1000_0000, ObjectId(2)))).unwrap();
        assert_eq!(next.hash, 0x8000_0000);
        assert!(leaf.first_after(0, Some((0xF000_0000, ObjectId(1)))).is_none());
    }

    #[test]
    fn bucket_index_uses_bits_after_depth() {
        let leaf: Leaf<String, String> = Leaf::new(4);
        assert_eq!(leaf.bucket_index(0, 0xC000_0000), 3);
        assert_eq!(leaf.bucket_index(1, 0xC000_0000), 2);
        assert_eq!(leaf.bucket_index(31, 0x0000_0001), 2);
        assert_eq!(leaf.bucket_index(32, u32::MAX), 0);
    }

    #[test]
    fn directory_widens_and_narrows() {
        let mut dir: Directory<String, String> = Directory::pair(node(1), node(2));
        dir.widen(3);
        assert_eq!(dir.children.len(), 8);
        assert_eq!(dir.span_of(node(2)), Some(4..8));
        assert_eq!(dir.child(0, 0x8000_0000), node(2));
        assert_eq!(dir.child(4, 0x0800_0000), node(2));

        dir.children[4] = node(3);
        dir.children[5] = node(3);
        assert!(dir.narrow());
        assert_eq!(dir.width, 2);
        assert_eq!(dir.distinct_children(), vec![node(1), node(3), node(2)]);

        dir.replace(node(3), node(2));
        assert!(dir.narrow());
        assert_eq!(dir.width, 1);
    }

    #[test]
    fn node_kind_accessors_report_corruption() {
        let leaf = Node::leaf(2, None, 2);
        assert!(leaf.is_leaf());
        assert!(leaf.as_directory().is_err());
        assert_eq!(leaf.as_leaf().unwrap().buckets.len(), 2);
    }
}
