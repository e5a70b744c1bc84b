//! Close and reopen a store holding many spines

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const CONCEPTS: u128 = 2_000;

fn small_spines() -> StoreConfig {
    StoreConfig {
        spine_size: 128,
        ..StoreConfig::default()
    }
}

#[test]
fn test_reopen_many_spines() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("terminology");

    let stamp = {
        let t = Terminology::new(EntityStore::open_with_config(&path, small_spines()).unwrap());
        let stamp = t.commit_active();
        for n in 0..CONCEPTS {
            let concept = t.put_concept(0x1_0000 + n, stamp);
            t.put_description(0x2_0000 + n, concept, &format!("term {}", n), stamp);
        }
        t.store.close().unwrap();
        stamp
    };

    let t = Terminology::new(EntityStore::open(&path).unwrap());
    assert_eq!(t.store.config().spine_size, 128);
    assert_eq!(t.store.entity_count(), 2 * CONCEPTS as usize + 1);
    assert!(t.store.get_stamp(stamp).unwrap().time.is_committed());
    assert_eq!(
        t.store.entity_nids_of_pattern(t.description_pattern).len(),
        CONCEPTS as usize
    );

    let coordinate = StampCoordinate::latest_on(t.development);
    let concept = t.nid(0x1_0000 + 1_234);
    let descriptions = t.store.semantic_nids_for_component(concept);
    assert_eq!(descriptions.len(), 1);
    assert_eq!(
        t.description_text(descriptions[0], &coordinate).as_deref(),
        Some("term 1234")
    );

    let semantics = AtomicUsize::new(0);
    t.store
        .par_for_each_entity(|entity| {
            if entity.kind() == EntityKind::Semantic {
                semantics.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();
    assert_eq!(semantics.into_inner(), CONCEPTS as usize);
}

#[test]
fn test_edits_after_reopen_append() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("terminology");
    let description = {
        let t = Terminology::new(EntityStore::open(&path).unwrap());
        let stamp = t.commit_active();
        let concept = t.put_concept(1, stamp);
        let description = t.put_description(2, concept, "first", stamp);
        t.store.close().unwrap();
        description
    };

    {
        let t = Terminology::new(EntityStore::open(&path).unwrap());
        let stamp = t.commit_active();
        let concept = t.nid(1);
        t.put_description(2, concept, "second", stamp);
        t.store.close().unwrap();
    }

    let t = Terminology::new(EntityStore::open(&path).unwrap());
    let coordinate = StampCoordinate::latest_on(t.development);
    let latest = t.store.latest(description, &coordinate).unwrap();
    assert_eq!(latest.entity().versions().len(), 2);
    assert_eq!(t.description_text(description, &coordinate).as_deref(), Some("second"));
}

#[test]
fn test_corrupt_spine_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("terminology");
    {
        let t = Terminology::new(EntityStore::open(&path).unwrap());
        let stamp = t.commit_active();
        t.put_concept(1, stamp);
        t.store.close().unwrap();
    }

    let spine_dir = path.join("entities");
    let spine = std::fs::read_dir(&spine_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("spine-"))
        })
        .expect("a spine file");
    let mut bytes = std::fs::read(&spine).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&spine, &bytes).unwrap();

    assert!(EntityStore::open(&path).is_err());
}
