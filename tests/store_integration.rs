//! Store integration tests.
//!
//! Verifies:
//! - The end-to-end whiteboard flow: add scene, draw, clean, keyframe, query
//! - Compaction correctness of the query blobs
//! - Bounds enforcement with zero side effects
//! - Scene idempotence and index conflicts
//! - Switch semantics (no-op on same target, rebuild on a new one)
//! - Rejection of unsupported administrative kinds
//! - Close semantics

use inkstore::{
    NewScene, Package, PackageType, PageSnapshot, PageTransform, SaveOutcome, StoreConfig,
    StoreError, WhiteboardStore,
};
use tempfile::tempdir;

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn open_store(dir: &std::path::Path) -> WhiteboardStore {
    WhiteboardStore::open(StoreConfig::for_testing(dir)).unwrap()
}

fn save(store: &WhiteboardStore, package: &Package) -> SaveOutcome {
    store.save_package(&package.encode().unwrap()).unwrap()
}

fn add_scene(store: &WhiteboardStore, index: u32, url: &str, pages: u32) -> u32 {
    let info = NewScene {
        resource_id: format!("r{index}"),
        resource_url: url.into(),
        page_count: pages,
        scene_type: 0,
        index,
    };
    match save(store, &Package::add_scene(0, &info)) {
        SaveOutcome::SceneAdded { index } => index,
        other => panic!("expected SceneAdded, got {other:?}"),
    }
}

fn query_page(store: &WhiteboardStore, scene: u32, page: u32) -> PageSnapshot {
    match save(store, &Package::scene_page_data(scene, page, 0)) {
        SaveOutcome::PageData(snapshot) => snapshot,
        other => panic!("expected PageData, got {other:?}"),
    }
}

fn command_ops(snapshot: &PageSnapshot) -> Vec<Vec<u8>> {
    let merged = Package::decode(&snapshot.commands).unwrap();
    assert_eq!(merged.kind, PackageType::DrawCommand);
    merged.draw_ops().unwrap().ops
}

// ─── End-to-End Flow ─────────────────────────────────────────────────────────

#[test]
fn test_draw_and_query_flow() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    assert_eq!(add_scene(&store, 0, "doc1", 3), 0);

    save(&store, &Package::draw(0, 0, 1, vec![b"A".to_vec()]));
    save(&store, &Package::draw(0, 0, 2, vec![b"B".to_vec()]));

    let snapshot = query_page(&store, 0, 0);
    assert!(snapshot.keyframe.is_none());
    assert_eq!(command_ops(&snapshot), vec![b"A".to_vec(), b"B".to_vec()]);

    save(&store, &Package::clean(0, 0, 3));
    let snapshot = query_page(&store, 0, 0);
    assert!(command_ops(&snapshot).is_empty());
}

#[test]
fn test_compaction_keyframe_then_draws() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 1);
    save(&store, &Package::switch_page(0, 0, 1));

    let kf = Package::keyframe(0, 0, 2);
    save(&store, &kf);
    for i in 0..5u8 {
        save(&store, &Package::draw(0, 0, 3 + i as i64, vec![vec![i]]));
    }

    let snapshot = query_page(&store, 0, 0);
    assert_eq!(
        snapshot.keyframe.clone().unwrap(),
        kf.encode().unwrap(),
        "keyframe blob equals the keyframe record"
    );
    assert_eq!(
        command_ops(&snapshot),
        (0..5u8).map(|i| vec![i]).collect::<Vec<_>>(),
        "command blob concatenates the draws in order"
    );
}

#[test]
fn test_clean_draw_yields_empty_command_blob() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 1);
    save(&store, &Package::switch_page(0, 0, 1));

    save(&store, &Package::draw(0, 0, 2, vec![b"x".to_vec()]));
    save(&store, &Package::clean(0, 0, 3));

    let snapshot = query_page(&store, 0, 0);
    assert!(snapshot.keyframe.is_none());
    assert!(command_ops(&snapshot).is_empty());
}

#[test]
fn test_query_untouched_page_is_empty_not_error() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 3);

    let snapshot = query_page(&store, 0, 2);
    assert!(snapshot.keyframe.is_none());
    assert!(command_ops(&snapshot).is_empty());
}

#[test]
fn test_extension_records_carry_no_ops() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 1);
    save(&store, &Package::switch_page(0, 0, 1));

    save(&store, &Package::draw(0, 0, 2, vec![b"A".to_vec()]));
    save(&store, &Package::extension(0, 0, 3, "pointer:on"));

    let snapshot = query_page(&store, 0, 0);
    assert_eq!(command_ops(&snapshot), vec![b"A".to_vec()]);
}

// ─── Bounds Enforcement ─────────────────────────────────────────────────────

#[test]
fn test_out_of_range_rejected_with_zero_side_effects() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 3);
    let before = store.stats().unwrap();

    for package in [
        Package::draw(0, 3, 1, vec![b"x".to_vec()]), // page out of range
        Package::draw(7, 0, 1, vec![b"x".to_vec()]), // unknown scene
        Package::clean(0, 99, 1),
        Package::switch_page(4, 0, 1),
        Package::keyframe(0, 3, 1),
        Package::page_change(9, 0, 1, PageTransform::default()),
        Package::scene_page_data(0, 3, 1),
    ] {
        let err = store.save_package(&package.encode().unwrap()).unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidIndex { .. }),
            "{:?} should be InvalidIndex, got {err:?}",
            package.kind
        );
    }

    let after = store.stats().unwrap();
    assert_eq!(before, after, "no disk writes, no cache mutation");
}

#[test]
fn test_decode_failure_fails_only_that_call() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 1);

    let err = store.save_package(&[0xFF, 0x00, 0xAB]).unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));

    // The store keeps serving.
    save(&store, &Package::draw(0, 0, 1, vec![b"ok".to_vec()]));
    assert_eq!(command_ops(&query_page(&store, 0, 0)), vec![b"ok".to_vec()]);
}

// ─── Scene Directory ────────────────────────────────────────────────────────

#[test]
fn test_add_scene_idempotent_replay() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    add_scene(&store, 0, "doc1", 3);
    let info = NewScene {
        resource_id: "r0".into(),
        resource_url: "doc1".into(),
        page_count: 3,
        scene_type: 0,
        index: 0,
    };
    let err = store
        .save_package(&Package::add_scene(0, &info).encode().unwrap())
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { index: 0 }));
    assert_eq!(store.stats().unwrap().scenes, 1);
}

#[test]
fn test_add_scene_index_conflict() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());

    add_scene(&store, 0, "doc1", 3);
    let info = NewScene {
        resource_id: "r9".into(),
        resource_url: "other-doc".into(),
        page_count: 3,
        scene_type: 0,
        index: 0,
    };
    let err = store
        .save_package(&Package::add_scene(0, &info).encode().unwrap())
        .unwrap_err();
    assert!(matches!(err, StoreError::SceneConflict { index: 0 }));
}

#[test]
fn test_scene_data_reports_current_pointer() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 3);

    match save(&store, &Package::scene_data(1)) {
        SaveOutcome::CurrentPage { current: None } => {}
        other => panic!("expected no current page, got {other:?}"),
    }

    save(&store, &Package::switch_page(0, 2, 2));
    match save(&store, &Package::scene_data(3)) {
        SaveOutcome::CurrentPage {
            current: Some((0, 2)),
        } => {}
        other => panic!("expected (0, 2), got {other:?}"),
    }
}

// ─── Switch Semantics ───────────────────────────────────────────────────────

#[test]
fn test_switch_to_current_page_is_noop() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 3);

    save(&store, &Package::switch_page(0, 1, 1));
    let before = store.stats().unwrap();

    match save(&store, &Package::switch_page(0, 1, 2)) {
        SaveOutcome::Unchanged => {}
        other => panic!("expected Unchanged, got {other:?}"),
    }
    assert_eq!(
        store.stats().unwrap(),
        before,
        "no log append, no rebuild on same-target switch"
    );
}

#[test]
fn test_switch_rebuilds_target_history() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 3);

    save(&store, &Package::switch_page(0, 0, 1));
    save(&store, &Package::draw(0, 0, 2, vec![b"page0".to_vec()]));

    save(&store, &Package::switch_page(0, 1, 3));
    save(&store, &Package::draw(0, 1, 4, vec![b"page1".to_vec()]));

    // Coming back rebuilds page 0 from its history.
    save(&store, &Package::switch_page(0, 0, 5));
    assert_eq!(store.current_page().unwrap(), Some((0, 0)));
    assert_eq!(
        command_ops(&query_page(&store, 0, 0)),
        vec![b"page0".to_vec()]
    );
    // The other page stays queryable off-line.
    assert_eq!(
        command_ops(&query_page(&store, 0, 1)),
        vec![b"page1".to_vec()]
    );
}

#[test]
fn test_switch_to_empty_page_leaves_placeholder_only() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 2);

    save(&store, &Package::switch_page(0, 1, 1));
    let stats = store.stats().unwrap();
    assert_eq!(stats.cached_entries, 1, "a single switch placeholder");
    assert!(command_ops(&query_page(&store, 0, 1)).is_empty());
}

// ─── Page Transforms ────────────────────────────────────────────────────────

#[test]
fn test_page_change_updates_transform_and_cache() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 2);
    save(&store, &Package::switch_page(0, 0, 1));

    let t = PageTransform {
        angle: 90.0,
        scale: 0.5,
        move_x: 12.0,
        move_y: -3.0,
    };
    save(&store, &Package::page_change(0, 0, 2, t));

    assert_eq!(store.page_transform(0, 0).unwrap(), t);
    // The change entered the cache but contributes no draw ops.
    assert!(command_ops(&query_page(&store, 0, 0)).is_empty());

    // Transform change on a non-current page updates that page only.
    let t2 = PageTransform {
        angle: 180.0,
        scale: 2.0,
        move_x: 0.0,
        move_y: 0.0,
    };
    save(&store, &Package::page_change(0, 1, 3, t2));
    assert_eq!(store.page_transform(0, 1).unwrap(), t2);
    assert_eq!(store.page_transform(0, 0).unwrap(), t);
}

#[test]
fn test_untouched_page_has_default_transform() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 2);

    assert_eq!(store.page_transform(0, 1).unwrap(), PageTransform::default());
    assert!(store.page_transform(0, 5).is_err());
    assert!(store.page_transform(3, 0).is_err());
}

// ─── Unsupported Kinds ──────────────────────────────────────────────────────

#[test]
fn test_administrative_kinds_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 1);
    let before = store.stats().unwrap();

    for kind in [
        PackageType::EnableUserDraw,
        PackageType::DeleteScene,
        PackageType::ModifyScene,
        PackageType::SceneOrderChange,
    ] {
        let package = Package {
            kind,
            scene: 0,
            page: 0,
            timestamp: 1,
            payload: Vec::new(),
        };
        let err = store.save_package(&package.encode().unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(k) if k == kind));
    }

    assert_eq!(store.stats().unwrap(), before);
}

// ─── Keyframe Emission ──────────────────────────────────────────────────────

#[test]
fn test_first_record_on_page_is_implicit_keyframe() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 3);

    assert_eq!(store.stats().unwrap().keyframed_pages, 0);
    save(&store, &Package::draw(0, 0, 1, vec![b"x".to_vec()]));
    assert_eq!(store.stats().unwrap().keyframed_pages, 1);

    // Subsequent draws on the same page do not add pointers.
    save(&store, &Package::draw(0, 0, 2, vec![b"y".to_vec()]));
    assert_eq!(store.stats().unwrap().keyframed_pages, 1);

    // A different page gets its own.
    save(&store, &Package::draw(0, 1, 3, vec![b"z".to_vec()]));
    assert_eq!(store.stats().unwrap().keyframed_pages, 2);
}

// ─── Close Semantics ────────────────────────────────────────────────────────

#[test]
fn test_close_then_use_is_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path());
    add_scene(&store, 0, "doc1", 1);

    assert!(store.is_open());
    store.close().unwrap();
    assert!(!store.is_open());

    let err = store
        .save_package(&Package::clean(0, 0, 1).encode().unwrap())
        .unwrap_err();
    assert!(matches!(err, StoreError::Closed));
    assert!(matches!(store.stats().unwrap_err(), StoreError::Closed));
    assert!(matches!(store.close().unwrap_err(), StoreError::Closed));
}
