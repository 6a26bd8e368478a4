//! Snapshot creation, listing, restore and retention through the public API.

use std::fs;

use autofix::error::SnapshotError;
use autofix::io::config::SnapshotConfig;
use autofix::io::snapshot::{SnapshotManager, create_snapshot, list_snapshots};
use autofix::test_support::TestWorkspace;

#[test]
fn cleanup_keeps_only_the_newest() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("src/lib.rs", "pub fn v0() {}\n").expect("write");
    let config = SnapshotConfig::default();

    let mut created = Vec::new();
    for n in 0..5 {
        ws.write("src/lib.rs", &format!("pub fn v{n}() {{}}\n"))
            .expect("write");
        created.push(create_snapshot(ws.root(), &config).expect("create").id);
    }

    let manager = SnapshotManager::new(ws.root(), &config);
    let removed = manager.cleanup(2).expect("cleanup");
    assert_eq!(removed.len(), 3);
    for id in &created[..3] {
        assert!(removed.contains(id));
    }

    let remaining: Vec<String> = list_snapshots(ws.root())
        .expect("list")
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(remaining, vec![created[4].clone(), created[3].clone()]);

    // Older snapshots still restore their own content.
    let restored = manager.restore(&created[3]).expect("restore");
    assert_eq!(
        fs::read_to_string(restored.join("src/lib.rs")).expect("read"),
        "pub fn v3() {}\n"
    );
    fs::remove_dir_all(restored).expect("remove restore dir");
}

#[test]
fn cleanup_with_fewer_snapshots_than_keep_removes_nothing() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("a.py", "print('a')\n").expect("write");
    let config = SnapshotConfig::default();
    create_snapshot(ws.root(), &config).expect("create");

    let manager = SnapshotManager::new(ws.root(), &config);
    assert!(manager.cleanup(5).expect("cleanup").is_empty());
    assert_eq!(manager.list().expect("list").len(), 1);
}

#[test]
fn restore_goes_to_fresh_directory_and_leaves_live_tree() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write("main.go", "package main\n").expect("write");
    let config = SnapshotConfig::default();
    let snapshot = create_snapshot(ws.root(), &config).expect("create");
    ws.write("main.go", "package changed\n").expect("write");

    let manager = SnapshotManager::new(ws.root(), &config);
    let first = manager.restore(&snapshot.id).expect("restore");
    let second = manager.restore(&snapshot.id).expect("restore again");
    assert_ne!(first, second);
    assert!(!first.starts_with(ws.root()));
    assert!(
        first
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .starts_with(&format!("autofix-restore-{}-", snapshot.id))
    );
    assert_eq!(
        fs::read_to_string(first.join("main.go")).expect("read"),
        "package main\n"
    );
    assert_eq!(ws.read("main.go").expect("read live"), "package changed\n");
    fs::remove_dir_all(first).expect("remove");
    fs::remove_dir_all(second).expect("remove");
}

#[test]
fn restore_unknown_id_is_not_found() {
    let ws = TestWorkspace::new().expect("workspace");
    let manager = SnapshotManager::new(ws.root(), &SnapshotConfig::default());
    let err = manager
        .restore("snap-19990101-000000-000000")
        .expect_err("missing");
    match err.downcast_ref::<SnapshotError>() {
        Some(SnapshotError::NotFound { id }) => assert_eq!(id, "snap-19990101-000000-000000"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn list_without_history_is_empty() {
    let ws = TestWorkspace::new().expect("workspace");
    assert!(list_snapshots(ws.root()).expect("list").is_empty());
}
