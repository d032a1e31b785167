// ABOUTME: Integration tests for the link, execute, promote cycle against temp data roots
// ABOUTME: Verifies idempotent linking, promotion safety and traversal pruning

#![cfg(unix)]

use plinth_core::Layout;
use plinth_persistence::{ArtifactClass, PersistenceReconciler};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn is_link(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn setup() -> (TempDir, Layout, PathBuf) {
    let temp = TempDir::new().unwrap();
    let layout = Layout::new(temp.path());
    let render = layout.render_dir("demo", "abc123");
    fs::create_dir_all(&render).unwrap();
    (temp, layout, render)
}

#[test]
fn test_second_link_pass_is_noop() {
    let (_temp, layout, render) = setup();
    let db_store = layout.live_data_dir("demo");
    fs::create_dir_all(db_store.join("nested")).unwrap();
    fs::write(db_store.join("app.sqlite"), b"one").unwrap();
    fs::write(db_store.join("nested/cache.db"), b"two").unwrap();
    let uploads = layout.uploads_dir("demo");
    fs::create_dir_all(uploads.join("avatars")).unwrap();
    fs::write(uploads.join("avatars/me.png"), b"png").unwrap();

    let reconciler = PersistenceReconciler::new(layout);
    let first = reconciler.link_all("demo", &render).unwrap();
    assert_eq!(first.created, 3);
    assert!(is_link(&render.join("uploads/avatars/me.png")));
    let before = fs::read_link(render.join("nested/cache.db")).unwrap();

    let second = reconciler.link_all("demo", &render).unwrap();
    assert_eq!(second.changes(), 0);
    assert_eq!(second.unchanged, 3);
    assert_eq!(fs::read_link(render.join("nested/cache.db")).unwrap(), before);
}

#[test]
fn test_stale_link_is_repaired() {
    let (_temp, layout, render) = setup();
    let store = layout.live_data_dir("demo");
    fs::create_dir_all(&store).unwrap();
    fs::write(store.join("app.db"), b"current").unwrap();
    std::os::unix::fs::symlink("/nonexistent/app.db", render.join("app.db")).unwrap();

    let reconciler = PersistenceReconciler::new(layout);
    let report = reconciler
        .link_into("demo", &render, ArtifactClass::Database)
        .unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(fs::read(render.join("app.db")).unwrap(), b"current");
}

#[test]
fn test_promotion_moves_bytes_and_leaves_link() {
    let (_temp, layout, render) = setup();
    fs::create_dir_all(render.join("data")).unwrap();
    fs::write(render.join("data/new.sqlite3"), b"fresh rows").unwrap();
    fs::create_dir_all(render.join("uploads/docs")).unwrap();
    fs::write(render.join("uploads/docs/report.pdf"), b"%PDF").unwrap();
    fs::write(render.join("index.php"), b"<?php").unwrap();

    let reconciler = PersistenceReconciler::new(layout.clone());
    let report = reconciler.promote_all("demo", &render).unwrap();
    assert_eq!(report.promoted, 2);
    assert_eq!(report.failed, 0);

    let durable_db = layout.live_data_dir("demo").join("data/new.sqlite3");
    assert_eq!(fs::read(&durable_db).unwrap(), b"fresh rows");
    assert!(is_link(&render.join("data/new.sqlite3")));
    assert_eq!(fs::read_link(render.join("data/new.sqlite3")).unwrap(), durable_db);

    let durable_upload = layout.uploads_dir("demo").join("docs/report.pdf");
    assert_eq!(fs::read(&durable_upload).unwrap(), b"%PDF");
    assert!(is_link(&render.join("uploads/docs/report.pdf")));

    // Non-artifact files stay where they are
    assert!(!is_link(&render.join("index.php")));

    let again = reconciler.promote_all("demo", &render).unwrap();
    assert_eq!(again.promoted, 0);
    assert_eq!(again.failed, 0);
}

#[test]
fn test_promote_then_link_is_stable() {
    let (_temp, layout, render) = setup();
    fs::write(render.join("app.db"), b"rows").unwrap();

    let reconciler = PersistenceReconciler::new(layout.clone());
    reconciler.promote_all("demo", &render).unwrap();
    let link = reconciler.link_all("demo", &render).unwrap();
    assert_eq!(link.changes(), 0);
    assert_eq!(link.unchanged, 1);

    // A fresh render of another commit picks up the durable copy
    let other = layout.render_dir("demo", "def456");
    fs::create_dir_all(&other).unwrap();
    let report = reconciler.link_all("demo", &other).unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(fs::read(other.join("app.db")).unwrap(), b"rows");
}

#[test]
fn test_traversal_skips_vcs_and_dependency_dirs() {
    let (_temp, layout, render) = setup();
    fs::create_dir_all(render.join("node_modules/pkg")).unwrap();
    fs::write(render.join("node_modules/pkg/fixture.db"), b"x").unwrap();
    fs::create_dir_all(render.join(".git")).unwrap();
    fs::write(render.join(".git/index.db"), b"x").unwrap();

    let reconciler = PersistenceReconciler::new(layout.clone());
    let report = reconciler.promote_all("demo", &render).unwrap();
    assert_eq!(report.promoted, 0);
    assert!(!layout.live_data_dir("demo").exists());
}

#[test]
fn test_uploads_outside_upload_subtree_are_not_promoted() {
    let (_temp, layout, render) = setup();
    fs::write(render.join("logo.png"), b"committed asset").unwrap();
    fs::write(render.join("package.json"), b"{}").unwrap();

    let reconciler = PersistenceReconciler::new(layout.clone());
    let report = reconciler
        .promote_from("demo", &render, ArtifactClass::Upload)
        .unwrap();
    assert_eq!(report.promoted, 0);
    assert!(!is_link(&render.join("logo.png")));
    assert!(!is_link(&render.join("package.json")));
}

#[test]
fn test_linked_directory_escape_is_rejected() {
    let (temp, layout, render) = setup();
    let outside = temp.path().join("outside");
    fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink(&outside, render.join("data")).unwrap();

    let store = layout.live_data_dir("demo");
    fs::create_dir_all(store.join("data")).unwrap();
    fs::write(store.join("data/app.db"), b"rows").unwrap();

    let reconciler = PersistenceReconciler::new(layout);
    let report = reconciler
        .link_into("demo", &render, ArtifactClass::Database)
        .unwrap();
    assert_eq!(report.failed, 1);
    assert!(!outside.join("app.db").exists());
}
