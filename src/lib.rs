//! A hash map that scales across concurrent writers by sharding its
//! contents over many small objects in a persistent object store.
//!
//! The map is addressed through [`storage::ScalableHashMap`]; it never holds
//! data itself and performs every read and write through an
//! [`primitives::store::ObjectStore`].

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::store::{MemStore, ObjectStore, SharedStore};
pub use storage::{MapOptions, ScalableHashMap, Stored};
pub use types::{MapError, ObjectId, ObjectRef, Result};
