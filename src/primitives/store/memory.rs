use std::any::{type_name, Any};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::{ObjectStore, Persistable};
use crate::types::{MapError, ObjectId, ObjectRef, Result};

type Boxed = Box<dyn Any + Send + Sync>;

/// Counters describing how a [`MemStore`] has been used.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreStats {
    /// Entities registered through `create_reference`.
    pub created: u64,
    /// Entities deleted through `remove`.
    pub removed: u64,
    /// Read-only resolutions.
    pub resolved: u64,
    /// Resolutions for update plus explicit `mark_dirty` calls.
    pub updated: u64,
    /// Entities currently alive.
    pub live: u64,
}

/// What a transaction touched, reported by [`MemStore::commit`].
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    /// Pre-existing entities flagged dirty, in id order.
    pub dirty: Vec<ObjectId>,
    /// Entities registered during the transaction.
    pub created: u64,
    /// Entities deleted during the transaction.
    pub removed: u64,
}

impl CommitSummary {
    /// Returns whether `id` was flagged dirty.
    pub fn is_dirty(&self, id: ObjectId) -> bool {
        self.dirty.binary_search(&id).is_ok()
    }
}

/// In-memory [`ObjectStore`].
///
/// Identifiers grow monotonically and are never reused, so a stale handle
/// always fails with [`MapError::ObjectNotFound`] instead of aliasing a
/// newer entity. Each transaction's dirty set is tracked until
/// [`MemStore::commit`] drains it.
pub struct MemStore {
    objects: FxHashMap<ObjectId, Boxed>,
    next_id: u64,
    dirty: FxHashSet<ObjectId>,
    txn_created: FxHashSet<ObjectId>,
    txn_removed: u64,
    created: u64,
    removed: u64,
    updated: u64,
    resolved: AtomicU64,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            objects: FxHashMap::default(),
            next_id: 1,
            dirty: FxHashSet::default(),
            txn_created: FxHashSet::default(),
            txn_removed: 0,
            created: 0,
            removed: 0,
            updated: 0,
            resolved: AtomicU64::new(0),
        }
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            created: self.created,
            removed: self.removed,
            resolved: self.resolved.load(AtomicOrdering::Relaxed),
            updated: self.updated,
            live: self.objects.len() as u64,
        }
    }

    /// Ends the current transaction and reports what it touched.
    pub fn commit(&mut self) -> CommitSummary {
        let mut dirty: Vec<ObjectId> = self
            .dirty
            .drain()
            .filter(|id| !self.txn_created.contains(id))
            .collect();
        dirty.sort_unstable();
        let summary = CommitSummary {
            dirty,
            created: self.txn_created.len() as u64,
            removed: self.txn_removed,
        };
        self.txn_created.clear();
        self.txn_removed = 0;
        debug!(
            target: "scalable_map::store",
            dirty = summary.dirty.len(),
            created = summary.created,
            removed = summary.removed,
            "committed transaction"
        );
        summary
    }

    fn lookup<T: Persistable>(&self, id: ObjectId) -> Result<&T> {
        let boxed = self.objects.get(&id).ok_or(MapError::ObjectNotFound(id))?;
        boxed
            .downcast_ref::<T>()
            .ok_or(MapError::TypeMismatch {
                id,
                expected: type_name::<T>(),
            })
    }
}

impl ObjectStore for MemStore {
    fn create_reference<T: Persistable>(&mut self, object: T) -> ObjectRef<T> {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, Box::new(object));
        self.txn_created.insert(id);
        self.created += 1;
        ObjectRef::from_id(id)
    }

    fn resolve<T: Persistable>(&self, handle: ObjectRef<T>) -> Result<&T> {
        self.resolved.fetch_add(1, AtomicOrdering::Relaxed);
        self.lookup(handle.id())
    }

    fn resolve_for_update<T: Persistable>(&mut self, handle: ObjectRef<T>) -> Result<&mut T> {
        let id = handle.id();
        let boxed = self
            .objects
            .get_mut(&id)
            .ok_or(MapError::ObjectNotFound(id))?;
        let object = boxed.downcast_mut::<T>().ok_or(MapError::TypeMismatch {
            id,
            expected: type_name::<T>(),
        })?;
        self.dirty.insert(id);
        self.updated += 1;
        Ok(object)
    }

    fn mark_dirty<T: Persistable>(&mut self, handle: ObjectRef<T>) -> Result<()> {
        self.lookup::<T>(handle.id())?;
        self.dirty.insert(handle.id());
        self.updated += 1;
        Ok(())
    }

    fn remove<T: Persistable>(&mut self, handle: ObjectRef<T>) -> Result<T> {
        let id = handle.id();
        self.lookup::<T>(id)?;
        let boxed = self
            .objects
            .remove(&id)
            .ok_or(MapError::ObjectNotFound(id))?;
        let object = boxed
            .downcast::<T>()
            .map_err(|_| MapError::Corruption("entity changed type during removal"))?;
        self.dirty.remove(&id);
        if !self.txn_created.remove(&id) {
            self.txn_removed += 1;
        }
        self.removed += 1;
        Ok(*object)
    }

    fn contains<T: Persistable>(&self, handle: ObjectRef<T>) -> bool {
        self.lookup::<T>(handle.id()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resolve_remove_roundtrip() -> Result<()> {
        let mut store = MemStore::new();
        let handle = store.create_reference(String::from("alpha"));
        assert_eq!(store.resolve(handle)?, "alpha");
        store.resolve_for_update(handle)?.push_str("-beta");
        assert_eq!(store.remove(handle)?, "alpha-beta");
        assert!(matches!(
            store.resolve(handle),
            Err(MapError::ObjectNotFound(id)) if id == handle.id()
        ));
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn ids_are_never_reused() {
        let mut store = MemStore::new();
        let first = store.create_reference(1u32);
        store.remove(first).unwrap();
        let second = store.create_reference(2u32);
        assert_ne!(first.id(), second.id());
        assert!(!store.contains(first));
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut store = MemStore::new();
        let handle = store.create_reference(7u64);
        let alias: ObjectRef<String> = ObjectRef::from_id(handle.id());
        assert!(matches!(
            store.resolve(alias),
            Err(MapError::TypeMismatch { .. })
        ));
        // the failed typed removal must leave the entity in place
        assert!(store.remove(alias).is_err());
        assert_eq!(*store.resolve(handle).unwrap(), 7);
    }

    #[test]
    fn commit_reports_only_preexisting_dirty_entities() {
        let mut store = MemStore::new();
        let old = store.create_reference(1u8);
        let doomed = store.create_reference(2u8);
        store.commit();

        let fresh = store.create_reference(3u8);
        store.resolve_for_update(fresh).unwrap();
        store.mark_dirty(old).unwrap();
        store.resolve_for_update(doomed).unwrap();
        store.remove(doomed).unwrap();
        let summary = store.commit();
        assert_eq!(summary.dirty, vec![old.id()]);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.removed, 1);
        assert!(store.commit().dirty.is_empty());
    }

    #[test]
    fn stats_track_usage() {
        let mut store = MemStore::new();
        let handle = store.create_reference(5i32);
        store.resolve(handle).unwrap();
        store.resolve(handle).unwrap();
        store.mark_dirty(handle).unwrap();
        let stats = store.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.resolved, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.live, 1);
    }

    #[test]
    fn mark_dirty_needs_a_live_handle_of_the_right_type() {
        let mut store = MemStore::new();
        let handle = store.create_reference(7u16);
        store.commit();
        let wrong: ObjectRef<String> = ObjectRef::from_id(handle.id());
        assert!(matches!(
            store.mark_dirty(wrong),
            Err(MapError::TypeMismatch { .. })
        ));
        store.remove(handle).unwrap();
        assert!(matches!(
            store.mark_dirty(handle),
            Err(MapError::ObjectNotFound(_))
        ));
        assert!(store.commit().dirty.is_empty());
    }
}
