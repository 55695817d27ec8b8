use std::borrow::Borrow;
use std::hash::Hash;

use super::ScalableHashMap;
use crate::primitives::store::{ObjectStore, Persistable};
use crate::storage::hashmap::cursor::{Iter, Keys, MapCursor, Values};
use crate::storage::hashmap::entry::{PrefixEntry, Stored};
use crate::storage::hashmap::hash::hash_key;
use crate::storage::hashmap::node::{NodeKind, NodeRef};
use crate::storage::MAX_DEPTH;
use crate::types::{MapError, Result};

impl<K, V> ScalableHashMap<K, V>
where
    K: Persistable + Hash + Eq,
    V: Persistable,
{
    /// Returns the value stored under `key`.
    ///
    /// A native value object that was deleted behind the map's back is
    /// reported as [`MapError::ObjectNotFound`].
    pub fn get<'s, S, Q>(&self, store: &'s S, key: &Q) -> Result<Option<&'s V>>
    where
        S: ObjectStore,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.find_entry(store, key)? {
            Some((_, entry)) => entry.value(store).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<'s, S, Q>(&self, store: &'s S, key: &Q) -> Result<Option<(&'s K, &'s V)>>
    where
        S: ObjectStore,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.find_entry(store, key)? {
            Some((_, entry)) => Ok(Some((entry.key(store)?, entry.value(store)?))),
            None => Ok(None),
        }
    }

    /// Returns whether an entry exists for `key`.
    pub fn contains_key<S, Q>(&self, store: &S, key: &Q) -> Result<bool>
    where
        S: ObjectStore,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        Ok(self.find_entry(store, key)?.is_some())
    }

    /// Inserts an owned key and value, returning the displaced value.
    pub fn put<S: ObjectStore>(&self, store: &mut S, key: K, value: V) -> Result<Option<Stored<V>>> {
        self.put_stored(store, Stored::Inline(key), Stored::Inline(value))
    }

    /// Inserts a key and value that may each be native store objects.
    ///
    /// When the key is already present its value is replaced and the key
    /// already in the map is kept. Only the leaf holding the entry is written,
    /// plus whatever a resulting split touches.
    pub fn put_stored<S: ObjectStore>(
        &self,
        store: &mut S,
        key: Stored<K>,
        value: Stored<V>,
    ) -> Result<Option<Stored<V>>> {
        let (hash, leaf_ref, found) = {
            let probe = key.resolve(store)?;
            let hash = hash_key(probe);
            let leaf_ref = self.lookup(store, hash)?;
            let node = store.resolve(leaf_ref)?;
            let found = node.as_leaf()?.find(store, node.depth, hash, probe)?;
            (hash, leaf_ref, found)
        };

        if let Some((bucket, pos)) = found {
            let entry = store.resolve(leaf_ref)?.as_leaf()?.buckets[bucket][pos];
            let (shape, old) = entry.set_value(store, value)?;
            if shape != entry.shape {
                store.resolve_for_update(leaf_ref)?.as_leaf_mut()?.buckets[bucket][pos].shape = shape;
            }
            return Ok(Some(old));
        }

        let entry = PrefixEntry::create(store, hash, key, value);
        let node = store.resolve_for_update(leaf_ref)?;
        let depth = node.depth;
        let leaf = node.as_leaf_mut()?;
        leaf.insert(depth, entry);
        if leaf.count >= self.options.split_threshold && depth < MAX_DEPTH {
            self.split(store, leaf_ref)?;
        }
        Ok(None)
    }

    /// Inserts every pair, discarding displaced values.
    pub fn put_all<S, I>(&self, store: &mut S, pairs: I) -> Result<()>
    where
        S: ObjectStore,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in pairs {
            self.put(store, key, value)?;
        }
        Ok(())
    }

    /// Removes the entry for `key`, returning its value.
    ///
    /// Wrappers the map created for the entry are deleted; native objects
    /// are left to their owner. Removing an absent key is a no-op.
    pub fn remove<S, Q>(&self, store: &mut S, key: &Q) -> Result<Option<Stored<V>>>
    where
        S: ObjectStore,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(key);
        let leaf_ref = self.lookup(store, hash)?;
        let found = {
            let node = store.resolve(leaf_ref)?;
            node.as_leaf()?.find(store, node.depth, hash, key)?
        };
        match found {
            Some((bucket, pos)) => self.detach(store, leaf_ref, bucket, pos).map(Some),
            None => Ok(None),
        }
    }

    /// Returns whether any entry holds a value equal to `value`.
    ///
    /// Entries whose objects have vanished are skipped.
    pub fn contains_value<S>(&self, store: &S, value: &V) -> Result<bool>
    where
        S: ObjectStore,
        V: PartialEq,
    {
        for candidate in self.values(store) {
            match candidate {
                Ok(candidate) if candidate == value => return Ok(true),
                Ok(_) | Err(MapError::ObjectNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    fn find_entry<S, Q>(&self, store: &S, key: &Q) -> Result<Option<(NodeRef<K, V>, PrefixEntry<K, V>)>>
    where
        S: ObjectStore,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(key);
        let leaf_ref = self.lookup(store, hash)?;
        let node = store.resolve(leaf_ref)?;
        let leaf = node.as_leaf()?;
        Ok(leaf
            .find(store, node.depth, hash, key)?
            .map(|(bucket, pos)| (leaf_ref, leaf.buckets[bucket][pos])))
    }
}

impl<K, V> ScalableHashMap<K, V>
where
    K: Persistable,
    V: Persistable,
{
    /// Number of entries, summed along the leaf chain.
    pub fn size<S: ObjectStore>(&self, store: &S) -> Result<usize> {
        let mut total = 0usize;
        let mut next = Some(self.leftmost(store)?);
        while let Some(leaf_ref) = next {
            let leaf = store.resolve(leaf_ref)?.as_leaf()?;
            total += leaf.count as usize;
            next = leaf.right;
        }
        Ok(total)
    }

    /// Returns whether the map holds no entries.
    ///
    /// Answered from the root alone while the root is a leaf; otherwise the
    /// leaf chain is walked until the first non-empty leaf.
    pub fn is_empty<S: ObjectStore>(&self, store: &S) -> Result<bool> {
        if let NodeKind::Leaf(leaf) = &store.resolve(self.root)?.kind {
            return Ok(leaf.count == 0);
        }
        let mut next = Some(self.leftmost(store)?);
        while let Some(leaf_ref) = next {
            let leaf = store.resolve(leaf_ref)?.as_leaf()?;
            if leaf.count > 0 {
                return Ok(false);
            }
            next = leaf.right;
        }
        Ok(true)
    }

    /// A detached cursor positioned before the first entry.
    pub fn cursor(&self) -> MapCursor<K, V> {
        MapCursor::new(self.clone())
    }

    /// Iterates over every entry in leaf-chain order.
    pub fn iter<'s, S: ObjectStore>(&self, store: &'s S) -> Iter<'s, K, V, S> {
        Iter::new(self.cursor(), store)
    }

    /// Iterates over every key.
    pub fn keys<'s, S: ObjectStore>(&self, store: &'s S) -> Keys<'s, K, V, S> {
        Keys::new(self.iter(store))
    }

    /// Iterates over every value.
    pub fn values<'s, S: ObjectStore>(&self, store: &'s S) -> Values<'s, K, V, S> {
        Values::new(self.iter(store))
    }

    /// Removes every entry and reseeds the tree to its minimum depth.
    ///
    /// The root keeps its identity, so handles opened on it stay valid.
    pub fn clear<S: ObjectStore>(&self, store: &mut S) -> Result<()> {
        let released = self.release_tree(store, false)?;
        self.seed(store)?;
        tracing::debug!(
            target: "scalable_map::clear",
            root = self.root.id().0,
            released,
            "cleared map"
        );
        Ok(())
    }

    /// Removes every entry, node and wrapper, including the root.
    pub fn destroy<S: ObjectStore>(self, store: &mut S) -> Result<()> {
        let released = self.release_tree(store, true)?;
        tracing::debug!(
            target: "scalable_map::clear",
            root = self.root.id().0,
            released,
            "destroyed map"
        );
        Ok(())
    }
}
