use std::sync::Arc;

use parking_lot::Mutex;

use super::{CommitSummary, MemStore};
use crate::types::Result;

/// A [`MemStore`] shared between threads.
///
/// Every closure handed to [`SharedStore::transaction`] runs with exclusive
/// access and ends with a commit, which stands in for the per-transaction
/// isolation a real persistent store provides.
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemStore>>,
}

impl SharedStore {
    /// Wraps an existing store.
    pub fn new(store: MemStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Runs `work` as one transaction and commits it.
    ///
    /// The transaction is committed even when `work` fails; undoing partial
    /// work is left to stores with real rollback.
    pub fn transaction<R, F>(&self, work: F) -> Result<(R, CommitSummary)>
    where
        F: FnOnce(&mut MemStore) -> Result<R>,
    {
        let mut store = self.inner.lock();
        let outcome = work(&mut store);
        let summary = store.commit();
        outcome.map(|value| (value, summary))
    }

    /// Runs a read-only closure against the store.
    pub fn read<R, F>(&self, work: F) -> R
    where
        F: FnOnce(&MemStore) -> R,
    {
        let store = self.inner.lock();
        work(&store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::store::ObjectStore;

    #[test]
    fn transactions_commit_their_dirty_sets() -> Result<()> {
        let shared = SharedStore::default();
        let (handle, summary) = shared.transaction(|store| Ok(store.create_reference(10u32)))?;
        assert_eq!(summary.created, 1);
        let ((), summary) = shared.transaction(|store| {
            *store.resolve_for_update(handle)? += 1;
            Ok(())
        })?;
        assert_eq!(summary.dirty, vec![handle.id()]);
        assert_eq!(shared.read(|store| *store.resolve(handle).unwrap()), 11);
        Ok(())
    }

    #[test]
    fn threads_serialise_through_the_lock() {
        let shared = SharedStore::default();
        let (counter, _) = shared
            .transaction(|store| Ok(store.create_reference(0u64)))
            .unwrap();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let shared = shared.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        shared
                            .transaction(|store| {
                                *store.resolve_for_update(counter)? += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(shared.read(|store| *store.resolve(counter).unwrap()), 400);
    }
}
