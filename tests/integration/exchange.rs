//! Change sets between independent persistent stores

use crate::common::*;
use tempfile::TempDir;

#[test]
fn test_export_import_between_persistent_stores() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("release.tkcs");

    {
        let source = Terminology::new(EntityStore::open(temp_dir.path().join("source")).unwrap());
        // burn nids so source and target numbering differ
        for n in 0..100 {
            source.nid(0x9_0000 + n);
        }
        let stamp = source.commit_active();
        for n in 0..50 {
            let concept = source.put_concept(0x1_0000 + n, stamp);
            source.put_description(0x2_0000 + n, concept, &format!("term {}", n), stamp);
        }
        assert_eq!(export_store(&source.store, &file).unwrap(), 101);
        source.store.close().unwrap();
    }

    let target_dir = temp_dir.path().join("target");
    {
        let target = Terminology::new(EntityStore::open(&target_dir).unwrap());
        let reader = ChangeSetReader::open(&file).unwrap();
        let report = BulkLoader::new(&target.store).load(&reader);
        assert_eq!(report.loaded, 101);
        assert!(report.first_errors.is_empty());
        target.store.close().unwrap();
    }

    let target = Terminology::new(EntityStore::open(&target_dir).unwrap());
    let coordinate = StampCoordinate::latest_on(target.development);
    let concept = target.nid(0x1_0000 + 7);
    let descriptions = target.store.semantic_nids_for_component(concept);
    assert_eq!(descriptions.len(), 1);
    assert_eq!(
        target.description_text(descriptions[0], &coordinate).as_deref(),
        Some("term 7")
    );
}

#[test]
fn test_import_merges_with_local_edits() {
    let shared = Terminology::ephemeral();
    let stamp = shared.commit_active();
    let concept = shared.put_concept(1, stamp);
    shared.put_description(2, concept, "released", stamp);

    let mut writer = ChangeSetWriter::new();
    shared
        .store
        .for_each_entity(|entity| writer.add(&entity, &shared.store).unwrap())
        .unwrap();
    let release = ChangeSetReader::from_bytes(&writer.to_bytes().unwrap()).unwrap();

    let local = Terminology::ephemeral();
    BulkLoader::new(&local.store).load(&release);
    let description = local.nid(2);
    let local_edit = local.commit_active();
    local.put_description(2, local.nid(1), "local wording", local_edit);

    // reloading the release keeps the local version
    let report = BulkLoader::new(&local.store).load(&release);
    assert_eq!(report.failed, 0);
    let coordinate = StampCoordinate::latest_on(local.development);
    let latest = local.store.latest(description, &coordinate).unwrap();
    assert_eq!(latest.entity().versions().len(), 2);
    assert_eq!(
        local.description_text(description, &coordinate).as_deref(),
        Some("local wording")
    );
}
