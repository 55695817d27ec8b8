#![forbid(unsafe_code)]

mod memory;
mod shared;

pub use memory::{CommitSummary, MemStore, StoreStats};
pub use shared::SharedStore;

use std::any::Any;

use crate::types::{ObjectRef, Result};

/// Marker for types an [`ObjectStore`] can hold.
pub trait Persistable: Any + Send + Sync {}

impl<T: Any + Send + Sync> Persistable for T {}

/// Seam to the persistent object store the map is layered on.
///
/// The store owns every entity, hands out stable [`ObjectRef`] handles and
/// tracks which entities the enclosing transaction modified. Isolation,
/// durability and recovery are the store's business; callers of this trait
/// only register, resolve, flag and delete entities.
pub trait ObjectStore {
    /// Registers `object` and returns a handle to it.
    fn create_reference<T: Persistable>(&mut self, object: T) -> ObjectRef<T>;

    /// Resolves a handle for reading.
    fn resolve<T: Persistable>(&self, handle: ObjectRef<T>) -> Result<&T>;

    /// Resolves a handle for writing and flags the entity dirty.
    fn resolve_for_update<T: Persistable>(&mut self, handle: ObjectRef<T>) -> Result<&mut T>;

    /// Flags an entity as modified without fetching it again.
    ///
    /// The map routes all of its own writes through
    /// [`ObjectStore::resolve_for_update`] and never calls this. It exists for
    /// owners of native keys and values that mutate those objects outside the
    /// map and still need the change recorded.
    fn mark_dirty<T: Persistable>(&mut self, handle: ObjectRef<T>) -> Result<()>;

    /// Permanently deletes an entity, handing ownership back to the caller.
    fn remove<T: Persistable>(&mut self, handle: ObjectRef<T>) -> Result<T>;

    /// Returns whether the handle still names a live entity.
    fn contains<T: Persistable>(&self, handle: ObjectRef<T>) -> bool {
        self.resolve(handle).is_ok()
    }
}
