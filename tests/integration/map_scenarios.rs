#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use scalable_map::storage::{CounterMetrics, MapOptions, ScalableHashMap, Stored};
use scalable_map::{MapError, MemStore, ObjectStore, Result};

fn tiny_options() -> MapOptions {
    MapOptions::new()
        .leaf_capacity(4)
        .split_threshold(3)
        .merge_threshold(1)
        .min_concurrency(1)
}

#[test]
fn letters_scenario_end_to_end() -> Result<()> {
    let mut store = MemStore::new();
    let map: ScalableHashMap<String, String> = ScalableHashMap::create(&mut store, tiny_options())?;
    for letter in ["a", "b", "c", "d"] {
        map.put(&mut store, letter.to_string(), letter.to_uppercase())?;
    }
    for letter in ["a", "b", "c", "d"] {
        assert_eq!(
            map.get(&store, letter)?.map(String::as_str),
            Some(letter.to_uppercase().as_str())
        );
    }
    let stats = map.stats(&store)?;
    assert!(stats.leaves >= 2);
    assert_eq!(stats.entries, 4);

    let removed = map.remove(&mut store, "c")?.and_then(Stored::into_inline);
    assert_eq!(removed.as_deref(), Some("C"));
    assert_eq!(map.get(&store, "c")?, None);
    assert!(map.remove(&mut store, "c")?.is_none());
    assert_eq!(map.size(&store)?, 3);
    assert!(map.verify(&store)?.success);
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let options = MapOptions::from_toml_str(
        r#"
        min_concurrency = 8
        leaf_capacity = 16
        split_threshold = 12
        merge_threshold = 3
        directory_size = 8
        "#,
    )?;
    let mut store = MemStore::new();
    let map: ScalableHashMap<u64, u64> = ScalableHashMap::create(&mut store, options)?;
    assert_eq!(map.stats(&store)?.leaves, 8);
    assert!(matches!(
        MapOptions::from_toml_str("unknown_knob = 1"),
        Err(MapError::Config(_))
    ));
    Ok(())
}

#[test]
fn reopened_handles_share_contents() -> Result<()> {
    let mut store = MemStore::new();
    let options = MapOptions::default();
    let writer: ScalableHashMap<u64, String> = ScalableHashMap::create(&mut store, options)?;
    let reader: ScalableHashMap<u64, String> =
        ScalableHashMap::open(&store, writer.root_id(), options)?;
    for i in 0..1_000u64 {
        writer.put(&mut store, i, format!("v{i}"))?;
    }
    assert_eq!(reader.size(&store)?, 1_000);
    assert_eq!(reader.get(&store, &999u64)?.map(String::as_str), Some("v999"));
    Ok(())
}

#[test]
fn grow_then_shrink_keeps_iteration_complete() -> Result<()> {
    let mut store = MemStore::new();
    let metrics = Arc::new(CounterMetrics::default());
    let options = MapOptions::new()
        .leaf_capacity(8)
        .split_threshold(8)
        .merge_threshold(3)
        .min_concurrency(2)
        .directory_size(4);
    let map: ScalableHashMap<u32, u32> =
        ScalableHashMap::create(&mut store, options)?.with_metrics(metrics.clone());

    let mut reference = BTreeMap::new();
    for i in 0..3_000u32 {
        map.put(&mut store, i, i * 2)?;
        reference.insert(i, i * 2);
    }
    for i in (0..3_000u32).filter(|i| i % 5 != 0) {
        map.remove(&mut store, &i)?;
        reference.remove(&i);
    }
    assert!(metrics.splits() > 0);
    assert!(metrics.merges() > 0);

    let mut seen = BTreeMap::new();
    for item in map.iter(&store) {
        let (k, v) = item?;
        assert!(seen.insert(*k, *v).is_none(), "key {k} visited twice");
    }
    assert_eq!(seen, reference);

    let report = map.verify(&store)?;
    assert!(report.success, "{:#?}", report.findings);
    assert_eq!(report.entries_checked, reference.len() as u64);
    Ok(())
}

#[test]
fn clear_then_destroy_leaves_only_native_objects() -> Result<()> {
    let mut store = MemStore::new();
    let map: ScalableHashMap<String, u64> = ScalableHashMap::create(&mut store, tiny_options())?;
    let kept = store.create_reference(42u64);
    map.put_stored(&mut store, Stored::Inline("native".into()), kept.into())?;
    map.put_all(&mut store, (0..40u64).map(|i| (format!("k{i}"), i)))?;

    map.clear(&mut store)?;
    assert!(map.is_empty(&store)?);
    map.put(&mut store, "after".into(), 1)?;
    map.destroy(&mut store)?;

    assert_eq!(store.len(), 1);
    assert_eq!(*store.resolve(kept)?, 42);
    Ok(())
}
