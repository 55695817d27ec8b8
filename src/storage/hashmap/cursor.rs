//! Detached cursors and the borrowing iterators built on them.

use super::entry::{ignore_missing, PrefixEntry, Stored};
use super::map::ScalableHashMap;
use super::node::NodeRef;
use crate::primitives::store::{ObjectStore, Persistable};
use crate::types::{MapError, ObjectId, Result};

enum Position<K, V> {
    Start,
    After {
        leaf: NodeRef<K, V>,
        hash: u32,
        key_id: ObjectId,
    },
}

#[derive(Clone, Copy)]
struct Current {
    hash: u32,
    key_id: ObjectId,
    removed: bool,
}

/// A cursor over a map that holds handles only.
///
/// Between steps the cursor remembers the leaf it last read from and the
/// `(hash, key_id)` of the last entry it returned. Each step re-resolves
/// that leaf; when the leaf has since been split, merged away or collapsed
/// the cursor finds the leaf now covering the remembered hash and resumes
/// after the remembered entry. Mutating the map between steps is therefore
/// allowed, though entries inserted behind the cursor are not visited.
pub struct MapCursor<K, V> {
    map: ScalableHashMap<K, V>,
    position: Position<K, V>,
    current: Option<Current>,
    finished: bool,
}

impl<K, V> MapCursor<K, V>
where
    K: Persistable,
    V: Persistable,
{
    pub(crate) fn new(map: ScalableHashMap<K, V>) -> Self {
        Self {
            map,
            position: Position::Start,
            current: None,
            finished: false,
        }
    }

    /// Returns whether another entry remains.
    pub fn has_next<S: ObjectStore>(&self, store: &S) -> Result<bool> {
        Ok(self.locate(store)?.is_some())
    }

    /// Advances and returns the next key and value.
    ///
    /// Fails with [`MapError::Exhausted`] once every entry has been returned.
    pub fn next_entry<'s, S: ObjectStore>(&mut self, store: &'s S) -> Result<(&'s K, &'s V)> {
        let entry = self.advance(store)?.ok_or(MapError::Exhausted)?;
        Ok((entry.key(store)?, entry.value(store)?))
    }

    /// Removes the entry most recently returned by the cursor.
    ///
    /// Returns `None` when that entry was already removed through some
    /// other path. Calling this before the first step, or twice for the same
    /// entry, fails with [`MapError::InvalidState`].
    pub fn remove_current<S: ObjectStore>(&mut self, store: &mut S) -> Result<Option<Stored<V>>> {
        let current = self
            .current
            .as_mut()
            .ok_or(MapError::InvalidState("cursor has no current entry"))?;
        if current.removed {
            return Err(MapError::InvalidState("current entry already removed"));
        }
        current.removed = true;
        let (hash, key_id) = (current.hash, current.key_id);
        self.map.remove_entry(store, hash, key_id)
    }

    pub(crate) fn advance<S: ObjectStore>(&mut self, store: &S) -> Result<Option<PrefixEntry<K, V>>> {
        match self.locate(store)? {
            Some((leaf, entry)) => {
                self.position = Position::After {
                    leaf,
                    hash: entry.hash,
                    key_id: entry.key_id(),
                };
                self.current = Some(Current {
                    hash: entry.hash,
                    key_id: entry.key_id(),
                    removed: false,
                });
                Ok(Some(entry))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn locate<S: ObjectStore>(&self, store: &S) -> Result<Option<(NodeRef<K, V>, PrefixEntry<K, V>)>> {
        if self.finished {
            return Ok(None);
        }
        let (mut leaf_ref, mut after) = match &self.position {
            Position::Start => (self.map.leftmost(store)?, None),
            Position::After { leaf, hash, key_id } => {
                (self.relocate(store, *leaf, *hash)?, Some((*hash, *key_id)))
            }
        };
        loop {
            let node = store.resolve(leaf_ref)?;
            let leaf = node.as_leaf()?;
            if let Some(entry) = leaf.first_after(node.depth, after) {
                return Ok(Some((leaf_ref, entry)));
            }
            match leaf.right {
                Some(next) => {
                    leaf_ref = next;
                    after = None;
                }
                None => return Ok(None),
            }
        }
    }

    /// The leaf to resume from: the remembered one while it is still a
    /// leaf, otherwise whichever leaf now covers `hash`.
    fn relocate<S: ObjectStore>(&self, store: &S, leaf: NodeRef<K, V>, hash: u32) -> Result<NodeRef<K, V>> {
        match ignore_missing(store.resolve(leaf))? {
            Some(node) if node.is_leaf() => Ok(leaf),
            _ => self.map.lookup(store, hash),
        }
    }
}

/// Iterator over `(key, value)` pairs borrowed from the store.
///
/// A failure to resolve one entry is yielded as an error and iteration
/// continues with the next entry; a structural failure ends iteration.
pub struct Iter<'s, K, V, S> {
    cursor: MapCursor<K, V>,
    store: &'s S,
    done: bool,
}

impl<'s, K, V, S> Iter<'s, K, V, S>
where
    K: Persistable,
    V: Persistable,
    S: ObjectStore,
{
    pub(crate) fn new(cursor: MapCursor<K, V>, store: &'s S) -> Self {
        Self {
            cursor,
            store,
            done: false,
        }
    }

    fn next_raw(&mut self) -> Option<Result<PrefixEntry<K, V>>> {
        if self.done {
            return None;
        }
        match self.cursor.advance(self.store) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<'s, K, V, S> Iterator for Iter<'s, K, V, S>
where
    K: Persistable,
    V: Persistable,
    S: ObjectStore,
{
    type Item = Result<(&'s K, &'s V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.store;
        self.next_raw()
            .map(|entry| entry.and_then(|e| Ok((e.key(store)?, e.value(store)?))))
    }
}

/// Iterator over keys; values are never resolved.
pub struct Keys<'s, K, V, S> {
    inner: Iter<'s, K, V, S>,
}

impl<'s, K, V, S> Keys<'s, K, V, S> {
    pub(crate) fn new(inner: Iter<'s, K, V, S>) -> Self {
        Self { inner }
    }
}

impl<'s, K, V, S> Iterator for Keys<'s, K, V, S>
where
    K: Persistable,
    V: Persistable,
    S: ObjectStore,
{
    type Item = Result<&'s K>;

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.inner.store;
        self.inner.next_raw().map(|entry| entry.and_then(|e| e.key(store)))
    }
}

/// Iterator over values.
pub struct Values<'s, K, V, S> {
    inner: Iter<'s, K, V, S>,
}

impl<'s, K, V, S> Values<'s, K, V, S> {
    pub(crate) fn new(inner: Iter<'s, K, V, S>) -> Self {
        Self { inner }
    }
}

impl<'s, K, V, S> Iterator for Values<'s, K, V, S>
where
    K: Persistable,
    V: Persistable,
    S: ObjectStore,
{
    type Item = Result<&'s V>;

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.inner.store;
        self.inner.next_raw().map(|entry| entry.and_then(|e| e.value(store)))
    }
}
