//! A development path branched from a parent path

use crate::common::*;

struct Branched {
    t: Terminology,
    parent: Nid,
    origin: StampTime,
    concept: Nid,
    description: Nid,
}

/// Parent-path description, then a branch point
fn branched() -> Branched {
    let t = Terminology::ephemeral();
    let parent = t.nid(0x0C01);
    let (stamp, _) = t.commit(t.active, t.core_module, parent);
    let concept = t.put_concept(1, stamp);
    let description = t.put_description(2, concept, "parent wording", stamp);
    let origin = t.store.get_stamp(stamp).unwrap().time;
    Branched {
        t,
        parent,
        origin,
        concept,
        description,
    }
}

fn child_view(b: &Branched) -> StampCoordinate {
    StampCoordinate::latest_on(b.t.development).with_origin(StampBranch::new(b.parent, b.origin))
}

#[test]
fn test_child_inherits_parent_content() {
    let b = branched();
    assert_eq!(
        b.t.description_text(b.description, &child_view(&b)).as_deref(),
        Some("parent wording")
    );
    // without the origin the parent is invisible
    let bare = StampCoordinate::latest_on(b.t.development);
    assert!(b.t.store.latest(b.description, &bare).unwrap().indices().is_empty());
}

#[test]
fn test_parent_edits_after_branch_point_stay_hidden() {
    let b = branched();
    let (later, _) = b.t.commit(b.t.active, b.t.core_module, b.parent);
    b.t.put_description(2, b.concept, "parent later", later);

    assert_eq!(
        b.t.description_text(b.description, &child_view(&b)).as_deref(),
        Some("parent wording")
    );
    let parent_view = StampCoordinate::latest_on(b.parent);
    assert_eq!(
        b.t.description_text(b.description, &parent_view).as_deref(),
        Some("parent later")
    );
}

#[test]
fn test_child_edit_supersedes_inherited_version() {
    let b = branched();
    let child = b.t.commit_active();
    b.t.put_description(2, b.concept, "child wording", child);

    assert_eq!(
        b.t.description_text(b.description, &child_view(&b)).as_deref(),
        Some("child wording")
    );
    let parent_view = StampCoordinate::latest_on(b.parent);
    assert_eq!(
        b.t.description_text(b.description, &parent_view).as_deref(),
        Some("parent wording")
    );
}

#[test]
fn test_branch_origin_display() {
    let b = branched();
    let branch = StampBranch::new(b.parent, b.origin);
    assert!(branch.to_user_string().contains(&b.parent.to_string()));
}
