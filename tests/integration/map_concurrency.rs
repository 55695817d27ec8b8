#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::{Arc, Barrier};
use std::thread;

use scalable_map::storage::{MapOptions, ScalableHashMap};
use scalable_map::{Result, SharedStore};

const NUM_THREADS: u64 = 8;
const OPERATIONS_PER_THREAD: u64 = 250;

#[test]
fn writers_on_disjoint_keys() -> Result<()> {
    let store = SharedStore::default();
    let options = MapOptions::new().min_concurrency(NUM_THREADS as u32);
    let (map, _) = store.transaction(|s| ScalableHashMap::<u64, u64>::create(s, options))?;
    let root = map.root_id();

    let barrier = Arc::new(Barrier::new(NUM_THREADS as usize));
    let mut handles = vec![];
    for thread_id in 0..NUM_THREADS {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let handle = thread::spawn(move || -> Result<u64> {
            let map = store.read(|s| ScalableHashMap::<u64, u64>::open(s, root, options))?;
            barrier.wait();
            let mut root_writes = 0;
            for i in 0..OPERATIONS_PER_THREAD {
                let key = thread_id * OPERATIONS_PER_THREAD + i;
                let ((), summary) = store.transaction(|s| {
                    map.put(s, key, key * 10)?;
                    Ok(())
                })?;
                if summary.is_dirty(map.root_id()) {
                    root_writes += 1;
                }
            }
            Ok(root_writes)
        });
        handles.push(handle);
    }

    for handle in handles {
        let root_writes = handle.join().expect("writer thread panicked")?;
        assert_eq!(root_writes, 0);
    }

    let total = NUM_THREADS * OPERATIONS_PER_THREAD;
    store.read(|s| -> Result<()> {
        assert_eq!(map.size(s)?, total as usize);
        for key in 0..total {
            assert_eq!(map.get(s, &key)?, Some(&(key * 10)));
        }
        let report = map.verify(s)?;
        assert!(report.success, "{:#?}", report.findings);
        Ok(())
    })
}

#[test]
fn concurrent_readers_and_writers() -> Result<()> {
    let store = SharedStore::default();
    let options = MapOptions::new().min_concurrency(4).split_threshold(16).merge_threshold(4);
    let (map, _) = store.transaction(|s| {
        let map = ScalableHashMap::<u64, u64>::create(s, options)?;
        map.put_all(s, (0..512u64).map(|k| (k, k)))?;
        Ok(map)
    })?;

    thread::scope(|scope| {
        for worker in 0..4u64 {
            let store = store.clone();
            let map = map.clone();
            scope.spawn(move || {
                for k in (0..512u64).filter(|k| k % 4 == worker) {
                    store
                        .transaction(|s| map.remove(s, &k).map(|_| ()))
                        .expect("remove");
                }
            });
        }
        for _ in 0..2 {
            let store = store.clone();
            let map = map.clone();
            scope.spawn(move || {
                for k in 0..512u64 {
                    store.read(|s| {
                        if let Some(v) = map.get(s, &k).expect("get") {
                            assert_eq!(*v, k);
                        }
                    });
                }
            });
        }
    });

    store.read(|s| -> Result<()> {
        assert!(map.is_empty(s)?);
        assert!(map.verify(s)?.success);
        Ok(())
    })
}
