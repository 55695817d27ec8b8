#![forbid(unsafe_code)]

//! Identifiers, typed handles and the error type shared by every layer.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Opaque identifier the object store assigns to a persisted entity.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        ObjectId(value)
    }
}

impl From<ObjectId> for u64 {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

/// Typed handle to an entity of type `T` held by an object store.
///
/// Handles are stable for the lifetime of the entity, cheap to copy and
/// totally ordered by their [`ObjectId`], so they can be compared and
/// resolved independently of one another.
pub struct ObjectRef<T> {
    id: ObjectId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObjectRef<T> {
    /// Wraps a raw identifier. Only stores should mint handles.
    pub fn from_id(id: ObjectId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped identifier behind this handle.
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectRef<T> {}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ObjectRef<T> {}

impl<T> PartialOrd for ObjectRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ObjectRef<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for ObjectRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.id.0)
    }
}

/// Errors surfaced by the store adapter and the map.
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    /// Construction parameters were rejected before any node was created.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Configuration text could not be parsed.
    #[error("configuration parse error: {0}")]
    Config(String),
    /// A handle no longer names a live entity.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),
    /// A handle was resolved as a type it was not created with.
    #[error("object {id} is not a {expected}")]
    TypeMismatch {
        /// Offending identifier.
        id: ObjectId,
        /// Type name the caller asked for.
        expected: &'static str,
    },
    /// Internal structure is inconsistent.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A cursor was advanced past its last entry.
    #[error("iterator exhausted")]
    Exhausted,
    /// An operation was issued in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// A report could not be serialised.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::{MapError, ObjectId, ObjectRef};
    use std::collections::HashSet;

    #[test]
    fn object_refs_compare_by_id() {
        let a: ObjectRef<String> = ObjectRef::from_id(ObjectId(3));
        let b: ObjectRef<String> = ObjectRef::from_id(ObjectId(7));
        assert!(a < b);
        assert_eq!(a, ObjectRef::from_id(ObjectId(3)));
        let set: HashSet<_> = [a, b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn not_found_renders_identifier() {
        let err = MapError::ObjectNotFound(ObjectId(42));
        assert_eq!(err.to_string(), "object 42 not found");
    }
}
