//! Version selection over one evolving terminology

use crate::common::*;

#[test]
fn test_rename_is_visible_only_after_its_commit() {
    init_tracing();
    let t = Terminology::ephemeral();
    let first = t.commit_active();
    let concept = t.put_concept(1, first);
    let description = t.put_description(2, concept, "Myocardial infarction", first);

    let before = t.store.get_stamp(first).unwrap().time;
    let second = t.commit_active();
    t.put_description(2, concept, "Heart attack", second);

    let now = StampCoordinate::latest_on(t.development);
    assert_eq!(t.description_text(description, &now).as_deref(), Some("Heart attack"));

    let then = now.clone().with_time(before);
    assert_eq!(
        t.description_text(description, &then).as_deref(),
        Some("Myocardial infarction")
    );
}

#[test]
fn test_status_filter_hides_retirement() {
    let t = Terminology::ephemeral();
    let created = t.commit_active();
    let concept = t.put_concept(1, created);
    let description = t.put_description(2, concept, "Old term", created);
    let (retired, _) = t.commit(t.inactive, t.core_module, t.development);
    t.put_description(2, concept, "Old term", retired);

    let any_status = StampCoordinate::latest_on(t.development);
    let latest = t.store.latest(description, &any_status).unwrap();
    assert_eq!(latest.indices(), &Latest::Single(1));

    let active_only = any_status.with_statuses([t.active]);
    let latest = t.store.latest(description, &active_only).unwrap();
    assert_eq!(latest.indices(), &Latest::Single(0));
}

#[test]
fn test_module_priority_breaks_simultaneous_edits() {
    let t = Terminology::ephemeral();
    let base = t.commit_active();
    let concept = t.put_concept(1, base);
    let description = t.put_description(2, concept, "base", base);

    // two edits sharing one commit time
    let core = t
        .store
        .new_stamp(t.active, t.author, t.core_module, t.development)
        .unwrap();
    let extension = t
        .store
        .new_stamp(t.active, t.author, t.extension_module, t.development)
        .unwrap();
    let time = t.store.commit_stamp(core).unwrap();
    let extension_public_id = t.store.public_id_for_nid(extension).unwrap();
    t.store
        .put_stamp(StampEntity::new(
            extension,
            extension_public_id,
            Stamp {
                status: t.active,
                time,
                author: t.author,
                module: t.extension_module,
                path: t.development,
            },
        ))
        .unwrap();
    assert_eq!(t.store.get_stamp(core).unwrap().time, time);

    t.put_description(2, concept, "core wording", core);
    t.put_description(2, concept, "extension wording", extension);

    let unordered = StampCoordinate::latest_on(t.development);
    let latest = t.store.latest(description, &unordered).unwrap();
    assert!(latest.indices().is_contradicted());
    assert_eq!(latest.indices().len(), 2);

    let extension_first = unordered
        .clone()
        .with_module_priority([t.extension_module, t.core_module]);
    assert_eq!(
        t.description_text(description, &extension_first).as_deref(),
        Some("extension wording")
    );

    let core_first = unordered.with_module_priority([t.core_module, t.extension_module]);
    assert_eq!(
        t.description_text(description, &core_first).as_deref(),
        Some("core wording")
    );
}

#[test]
fn test_canceled_edit_never_selected() {
    let t = Terminology::ephemeral();
    let base = t.commit_active();
    let concept = t.put_concept(1, base);
    let description = t.put_description(2, concept, "kept", base);

    let draft = t
        .store
        .new_stamp(t.active, t.author, t.core_module, t.development)
        .unwrap();
    t.put_description(2, concept, "draft", draft);
    let coordinate = StampCoordinate::latest_on(t.development);
    assert_eq!(t.description_text(description, &coordinate).as_deref(), Some("draft"));

    t.store.cancel_stamp(draft).unwrap();
    assert_eq!(t.description_text(description, &coordinate).as_deref(), Some("kept"));
}

#[test]
fn test_author_filter() {
    let t = Terminology::ephemeral();
    let base = t.commit_active();
    let concept = t.put_concept(1, base);
    let description = t.put_description(2, concept, "by fixture author", base);

    let other_author = t.nid(0x0B01);
    let stamp = t
        .store
        .new_stamp(t.active, other_author, t.core_module, t.development)
        .unwrap();
    t.store.commit_stamp(stamp).unwrap();
    t.put_description(2, concept, "by other author", stamp);

    let coordinate = StampCoordinate::latest_on(t.development).with_authors([t.author]);
    assert_eq!(
        t.description_text(description, &coordinate).as_deref(),
        Some("by fixture author")
    );
}
