//! Micro benchmarks for the prefix-sharded hash map.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scalable_map::storage::{MapOptions, ScalableHashMap};
use scalable_map::MemStore;

const INSERT_COUNT: u64 = 32_768;
const LOOKUP_SAMPLES: usize = 4_096;

struct FreshMap {
    store: MemStore,
    map: ScalableHashMap<u64, u64>,
}

impl FreshMap {
    fn new() -> Self {
        let mut store = MemStore::new();
        let map = ScalableHashMap::create(&mut store, MapOptions::default()).expect("create map");
        Self { store, map }
    }

    fn loaded(count: u64) -> Self {
        let mut fresh = Self::new();
        fresh.insert_keys(&(0..count).collect::<Vec<_>>());
        fresh
    }

    fn insert_keys(&mut self, keys: &[u64]) {
        for &key in keys {
            self.map.put(&mut self.store, key, key).expect("put");
        }
    }

    fn delete_keys(&mut self, keys: &[u64]) {
        for key in keys {
            self.map.remove(&mut self.store, key).expect("remove");
        }
    }
}

fn micro_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/hashmap");
    group.sample_size(20);

    let mut random_keys: Vec<u64> = (0..INSERT_COUNT).collect();
    random_keys.shuffle(&mut ChaCha8Rng::seed_from_u64(0xBEEF_F00D));

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("random_insert", |b| {
        b.iter_batched(
            FreshMap::new,
            |mut fresh| {
                fresh.insert_keys(&random_keys);
                black_box(fresh.map.root_id());
            },
            BatchSize::SmallInput,
        );
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("delete_random", |b| {
        b.iter_batched(
            || FreshMap::loaded(INSERT_COUNT),
            |mut fresh| {
                fresh.delete_keys(&random_keys);
                black_box(fresh.map.root_id());
            },
            BatchSize::SmallInput,
        );
    });

    let loaded = FreshMap::loaded(INSERT_COUNT);
    let samples = &random_keys[..LOOKUP_SAMPLES];
    group.throughput(Throughput::Elements(LOOKUP_SAMPLES as u64));
    group.bench_function("point_lookup", |b| {
        b.iter(|| {
            for key in samples {
                black_box(loaded.map.get(&loaded.store, key).expect("get"));
            }
        });
    });

    group.throughput(Throughput::Elements(INSERT_COUNT));
    group.bench_function("full_iteration", |b| {
        b.iter(|| black_box(loaded.map.iter(&loaded.store).count()));
    });

    group.finish();
}

criterion_group!(benches, micro_map);
criterion_main!(benches);
