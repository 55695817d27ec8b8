//! Entry shapes: how a key/value pair is held by the store.
//!
//! A pair is kept either as two native store objects, as one map-owned
//! wrapper holding both, or as a mix where one side is native and the other
//! lives in a wrapper the map owns. Wrappers are reshaped in place so that
//! the entry's identifier stays stable for cursor resumption.

use crate::primitives::store::{ObjectStore, Persistable};
use crate::types::{MapError, ObjectId, ObjectRef, Result};

/// A key or value as handed to, or returned from, the map.
///
/// `Inline` values are owned by the map once inserted and come back owned
/// when replaced or removed. `Native` handles point at objects the caller
/// registered in the store; the map never deletes those.
#[derive(PartialEq)]
pub enum Stored<T> {
    /// A plain value the map wraps and owns.
    Inline(T),
    /// A handle to an object that already lives in the store.
    Native(ObjectRef<T>),
}

impl<T: Persistable> Stored<T> {
    /// Returns the owned value, if this is an inline one.
    pub fn into_inline(self) -> Option<T> {
        match self {
            Stored::Inline(value) => Some(value),
            Stored::Native(_) => None,
        }
    }

    /// Returns the native handle, if this is one.
    pub fn native(&self) -> Option<ObjectRef<T>> {
        match self {
            Stored::Inline(_) => None,
            Stored::Native(handle) => Some(*handle),
        }
    }

    /// Borrows the value, resolving native handles through `store`.
    pub fn resolve<'a, S: ObjectStore>(&'a self, store: &'a S) -> Result<&'a T> {
        match self {
            Stored::Inline(value) => Ok(value),
            Stored::Native(handle) => store.resolve(*handle),
        }
    }
}

impl<T> From<ObjectRef<T>> for Stored<T> {
    fn from(handle: ObjectRef<T>) -> Self {
        Stored::Native(handle)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Stored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stored::Inline(value) => f.debug_tuple("Inline").field(value).finish(),
            Stored::Native(handle) => f.debug_tuple("Native").field(handle).finish(),
        }
    }
}

/// Map-owned holder for the sides of a pair that are not native objects.
///
/// A wrapper holding only a key, only a value, or both can be regrown or
/// shrunk in place as the entry changes shape.
pub(crate) struct Wrapper<K, V> {
    pub(crate) key: Option<K>,
    pub(crate) value: Option<V>,
}

pub(crate) type WrapperRef<K, V> = ObjectRef<Wrapper<K, V>>;

/// Where an entry's key lives.
pub(crate) enum KeySide<K, V> {
    Native(ObjectRef<K>),
    Wrapped(WrapperRef<K, V>),
}

/// Where an entry's value lives.
pub(crate) enum ValueSide<K, V> {
    Native(ObjectRef<V>),
    Wrapped(WrapperRef<K, V>),
}

/// The storage shape of one entry.
pub(crate) enum EntryShape<K, V> {
    /// Key and value are both native objects.
    Direct {
        key: ObjectRef<K>,
        value: ObjectRef<V>,
    },
    /// At least one side is wrapped, and the sides live apart.
    Wrapped {
        key: KeySide<K, V>,
        value: ValueSide<K, V>,
    },
    /// One wrapper owns both key and value.
    Combined { pair: WrapperRef<K, V> },
}

macro_rules! impl_handle_traits {
    ($($ty:ident),*) => {$(
        impl<K, V> Clone for $ty<K, V> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<K, V> Copy for $ty<K, V> {}
    )*};
}

impl_handle_traits!(KeySide, ValueSide, EntryShape, PrefixEntry);

impl<K, V> PartialEq for KeySide<K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeySide::Native(a), KeySide::Native(b)) => a == b,
            (KeySide::Wrapped(a), KeySide::Wrapped(b)) => a == b,
            _ => false,
        }
    }
}

impl<K, V> PartialEq for ValueSide<K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueSide::Native(a), ValueSide::Native(b)) => a == b,
            (ValueSide::Wrapped(a), ValueSide::Wrapped(b)) => a == b,
            _ => false,
        }
    }
}

impl<K, V> PartialEq for EntryShape<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.parts() == other.parts()
    }
}

impl<K, V> EntryShape<K, V> {
    /// Splits the shape into its two sides; a combined pair reports the same
    /// wrapper on both.
    pub(crate) fn parts(self) -> (KeySide<K, V>, ValueSide<K, V>) {
        match self {
            EntryShape::Direct { key, value } => (KeySide::Native(key), ValueSide::Native(value)),
            EntryShape::Wrapped { key, value } => (key, value),
            EntryShape::Combined { pair } => (KeySide::Wrapped(pair), ValueSide::Wrapped(pair)),
        }
    }

    /// Rebuilds the canonical shape for a pair of sides.
    pub(crate) fn from_parts(key: KeySide<K, V>, value: ValueSide<K, V>) -> Self {
        match (key, value) {
            (KeySide::Native(key), ValueSide::Native(value)) => EntryShape::Direct { key, value },
            (KeySide::Wrapped(a), ValueSide::Wrapped(b)) if a == b => {
                EntryShape::Combined { pair: a }
            }
            (key, value) => EntryShape::Wrapped { key, value },
        }
    }

    /// Stable identity of the entry's key, used to order equal hashes.
    pub(crate) fn key_id(self) -> ObjectId {
        match self.parts().0 {
            KeySide::Native(key) => key.id(),
            KeySide::Wrapped(wrapper) => wrapper.id(),
        }
    }
}

/// One slot of a leaf bucket: the routing hash plus the entry's shape.
pub(crate) struct PrefixEntry<K, V> {
    pub(crate) hash: u32,
    pub(crate) shape: EntryShape<K, V>,
}

impl<K, V> PrefixEntry<K, V> {
    pub(crate) fn key_id(&self) -> ObjectId {
        self.shape.key_id()
    }

    /// Total order of entries inside a leaf and across the leaf chain.
    pub(crate) fn order(&self) -> (u32, ObjectId) {
        (self.hash, self.key_id())
    }
}

impl<K: Persistable, V: Persistable> PrefixEntry<K, V> {
    /// Registers whatever wrappers the pair needs and builds its entry.
    pub(crate) fn create<S: ObjectStore>(
        store: &mut S,
        hash: u32,
        key: Stored<K>,
        value: Stored<V>,
    ) -> Self {
        let shape = match (key, value) {
            (Stored::Native(key), Stored::Native(value)) => EntryShape::Direct { key, value },
            (Stored::Inline(key), Stored::Inline(value)) => EntryShape::Combined {
                pair: store.create_reference(Wrapper {
                    key: Some(key),
                    value: Some(value),
                }),
            },
            (Stored::Inline(key), Stored::Native(value)) => EntryShape::Wrapped {
                key: KeySide::Wrapped(store.create_reference(Wrapper {
                    key: Some(key),
                    value: None,
                })),
                value: ValueSide::Native(value),
            },
            (Stored::Native(key), Stored::Inline(value)) => EntryShape::Wrapped {
                key: KeySide::Native(key),
                value: ValueSide::Wrapped(store.create_reference(Wrapper {
                    key: None,
                    value: Some(value),
                })),
            },
        };
        PrefixEntry { hash, shape }
    }

    pub(crate) fn key<'s, S: ObjectStore>(&self, store: &'s S) -> Result<&'s K> {
        match self.shape.parts().0 {
            KeySide::Native(key) => store.resolve(key),
            KeySide::Wrapped(wrapper) => store
                .resolve(wrapper)?
                .key
                .as_ref()
                .ok_or(MapError::Corruption("key wrapper holds no key")),
        }
    }

    /// Resolves the key, treating a vanished object as "no key".
    pub(crate) fn key_if_present<'s, S: ObjectStore>(&self, store: &'s S) -> Result<Option<&'s K>> {
        ignore_missing(self.key(store))
    }

    pub(crate) fn value<'s, S: ObjectStore>(&self, store: &'s S) -> Result<&'s V> {
        match self.shape.parts().1 {
            ValueSide::Native(value) => store.resolve(value),
            ValueSide::Wrapped(wrapper) => store
                .resolve(wrapper)?
                .value
                .as_ref()
                .ok_or(MapError::Corruption("value wrapper holds no value")),
        }
    }

    /// Replaces the value and returns the new shape with the displaced value.
    ///
    /// Wrappers are reused in place wherever the new value can live in one,
    /// and a value wrapper that is no longer needed is deleted.
    pub(crate) fn set_value<S: ObjectStore>(
        &self,
        store: &mut S,
        value: Stored<V>,
    ) -> Result<(EntryShape<K, V>, Stored<V>)> {
        let (key_side, value_side) = self.shape.parts();
        let (old, value_side) = match (value_side, value) {
            (ValueSide::Wrapped(wrapper), Stored::Inline(value)) => {
                let old = store
                    .resolve_for_update(wrapper)?
                    .value
                    .replace(value)
                    .ok_or(MapError::Corruption("value wrapper holds no value"))?;
                (Stored::Inline(old), ValueSide::Wrapped(wrapper))
            }
            (ValueSide::Wrapped(wrapper), Stored::Native(value)) => {
                let old = if key_side == KeySide::Wrapped(wrapper) {
                    store.resolve_for_update(wrapper)?.value.take()
                } else {
                    store.remove(wrapper)?.value
                };
                let old = old.ok_or(MapError::Corruption("value wrapper holds no value"))?;
                (Stored::Inline(old), ValueSide::Native(value))
            }
            (ValueSide::Native(old), Stored::Native(value)) => {
                (Stored::Native(old), ValueSide::Native(value))
            }
            (ValueSide::Native(old), Stored::Inline(value)) => {
                let side = match key_side {
                    KeySide::Wrapped(wrapper) => {
                        store.resolve_for_update(wrapper)?.value = Some(value);
                        ValueSide::Wrapped(wrapper)
                    }
                    KeySide::Native(_) => ValueSide::Wrapped(store.create_reference(Wrapper {
                        key: None,
                        value: Some(value),
                    })),
                };
                (Stored::Native(old), side)
            }
        };
        Ok((EntryShape::from_parts(key_side, value_side), old))
    }

    /// Deletes the entry's wrappers and hands back its value.
    ///
    /// A key wrapper that already vanished is ignored; a missing value
    /// wrapper is an error because the value cannot be returned.
    pub(crate) fn release<S: ObjectStore>(self, store: &mut S) -> Result<Stored<V>> {
        let (key_side, value_side) = self.shape.parts();
        if let KeySide::Wrapped(wrapper) = key_side {
            if value_side != ValueSide::Wrapped(wrapper) {
                ignore_missing(store.remove(wrapper))?;
            }
        }
        match value_side {
            ValueSide::Native(value) => Ok(Stored::Native(value)),
            ValueSide::Wrapped(wrapper) => store
                .remove(wrapper)?
                .value
                .map(Stored::Inline)
                .ok_or(MapError::Corruption("value wrapper holds no value")),
        }
    }

    /// Deletes the entry's wrappers, tolerating ones that already vanished.
    pub(crate) fn discard<S: ObjectStore>(self, store: &mut S) -> Result<()> {
        let (key_side, value_side) = self.shape.parts();
        if let KeySide::Wrapped(wrapper) = key_side {
            ignore_missing(store.remove(wrapper))?;
        }
        if let ValueSide::Wrapped(wrapper) = value_side {
            if key_side != KeySide::Wrapped(wrapper) {
                ignore_missing(store.remove(wrapper))?;
            }
        }
        Ok(())
    }
}

/// Maps [`MapError::ObjectNotFound`] to `None` and keeps every other outcome.
pub(crate) fn ignore_missing<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(MapError::ObjectNotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
