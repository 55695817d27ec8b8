#![forbid(unsafe_code)]

//! Prefix-sharded hash map whose nodes and entries live in an object store.
//!
//! Keys are routed by the leading bits of their hash through directory nodes
//! down to leaf bucket tables. Leaves split when they fill and fold back
//! into their sibling when they drain, so each write touches one leaf and
//! at most a small neighbourhood around it.

mod cursor;
mod entry;
/// Key hashing and prefix routing helpers.
pub mod hash;
mod map;
mod node;
mod stats;
mod verify;

pub use cursor::{Iter, Keys, MapCursor, Values};
pub use entry::Stored;
pub use map::ScalableHashMap;
pub use stats::MapStats;
pub use verify::{VerifyFinding, VerifyReport, VerifySeverity};
