//! Low-level primitives the map is built on.
//!
//! Holds the object store seam and its in-memory implementations.

/// Object store abstraction and in-memory stores.
///
/// Entities are registered once, addressed by typed handles and flagged
/// dirty when a transaction modifies them.
pub mod store;
