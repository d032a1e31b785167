// ABOUTME: Integration tests for commit materialization against real git repositories
// ABOUTME: Covers reuse, failure cleanup, concurrent identical requests, live refresh and sweeping

use git2::{IndexAddOption, Oid, Repository, Signature};
use plinth_core::Layout;
use plinth_git_utils::{CommitMaterializer, MaterializeError};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    for (name, content) in files {
        let path = workdir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("Plinth Test", "test@plinth.dev").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

fn setup_site(temp: &TempDir, site: &str) -> (Layout, Repository) {
    let layout = Layout::new(temp.path());
    let repo = Repository::init(layout.site_dir(site)).unwrap();
    (layout, repo)
}

fn partial_dirs(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|name| name.contains(".partial-"))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_ensure_materializes_exact_tree() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let first = commit_files(&repo, &[("index.php", "v1"), ("assets/app.css", "body{}")], "one");
    commit_files(&repo, &[("index.php", "v2")], "two");

    let materializer = CommitMaterializer::new(layout.clone());
    let commit = first.to_string();
    let render = materializer.ensure("demo", &commit).await.unwrap();

    assert_eq!(fs::read_to_string(render.join("index.php")).unwrap(), "v1");
    assert_eq!(fs::read_to_string(render.join("assets/app.css")).unwrap(), "body{}");
    assert!(!render.join(".git").exists());

    // The site's own working tree and HEAD are untouched
    assert_eq!(
        fs::read_to_string(layout.site_dir("demo").join("index.php")).unwrap(),
        "v2"
    );
    assert_ne!(repo.head().unwrap().target().unwrap(), first);
}

#[tokio::test]
async fn test_ensure_reuses_existing_render() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let oid = commit_files(&repo, &[("index.html", "hello")], "init");

    let materializer = CommitMaterializer::new(layout);
    let commit = oid.to_string();
    let first = materializer.ensure("demo", &commit).await.unwrap();
    fs::write(first.join("marker"), "kept").unwrap();

    let second = materializer.ensure("demo", &commit).await.unwrap();
    assert_eq!(first, second);
    assert!(second.join("marker").exists());
}

#[tokio::test]
async fn test_abbreviated_commit_is_resolved() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let oid = commit_files(&repo, &[("index.html", "short")], "init");

    let materializer = CommitMaterializer::new(layout);
    let short = &oid.to_string()[..10];
    let render = materializer.ensure("demo", short).await.unwrap();
    assert!(render.ends_with(short));
    assert_eq!(fs::read_to_string(render.join("index.html")).unwrap(), "short");
}

#[tokio::test]
async fn test_unknown_commit_fails_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    commit_files(&repo, &[("index.html", "x")], "init");

    let materializer = CommitMaterializer::new(layout.clone());
    let result = materializer.ensure("demo", "deadbeefdeadbeef").await;

    match result {
        Err(MaterializeError::MaterializationFailed { site, commit, .. }) => {
            assert_eq!(site, "demo");
            assert_eq!(commit, "deadbeefdeadbeef");
        }
        other => panic!("expected MaterializationFailed, got {:?}", other),
    }
    assert!(!layout.render_dir("demo", "deadbeefdeadbeef").exists());
    assert!(partial_dirs(&layout.site_renders_dir("demo")).is_empty());
}

#[tokio::test]
async fn test_missing_site_is_reported() {
    let temp = TempDir::new().unwrap();
    let materializer = CommitMaterializer::new(Layout::new(temp.path()));
    let result = materializer.ensure("ghost", "abc123").await;
    assert!(matches!(result, Err(MaterializeError::SiteNotFound { .. })));
}

#[tokio::test]
async fn test_invalid_identifiers_are_rejected() {
    let temp = TempDir::new().unwrap();
    let materializer = CommitMaterializer::new(Layout::new(temp.path()));
    assert!(matches!(
        materializer.ensure("../etc", "abc123").await,
        Err(MaterializeError::InvalidId(_))
    ));
    assert!(matches!(
        materializer.ensure("demo", "../../x").await,
        Err(MaterializeError::InvalidId(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_yields_single_complete_render() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let files: Vec<(String, String)> = (0..50)
        .map(|i| (format!("pages/page{}.html", i), format!("content {}", i)))
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    let oid = commit_files(&repo, &borrowed, "many files");
    let commit = oid.to_string();

    let materializer = CommitMaterializer::new(layout.clone());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let materializer = materializer.clone();
            let commit = commit.clone();
            tokio::spawn(async move { materializer.ensure("demo", &commit).await })
        })
        .collect();

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().unwrap());
    }
    assert!(paths.windows(2).all(|w| w[0] == w[1]));

    let render = &paths[0];
    assert_eq!(fs::read_dir(render.join("pages")).unwrap().count(), 50);
    assert!(partial_dirs(&layout.site_renders_dir("demo")).is_empty());
}

#[tokio::test]
async fn test_refresh_live_switches_commits() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let first = commit_files(&repo, &[("index.html", "first"), ("old.txt", "x")], "one");
    fs::remove_file(layout.site_dir("demo").join("old.txt")).unwrap();
    let mut index = repo.index().unwrap();
    index.remove_path(Path::new("old.txt")).unwrap();
    index.write().unwrap();
    let second = commit_files(&repo, &[("index.html", "second")], "two");

    let materializer = CommitMaterializer::new(layout.clone());
    let live = materializer
        .refresh_live("demo", &first.to_string())
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(live.join("index.html")).unwrap(), "first");
    assert!(live.join("old.txt").exists());

    let live = materializer
        .refresh_live("demo", &second.to_string())
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(live.join("index.html")).unwrap(), "second");
    assert!(!live.join("old.txt").exists());
    assert_eq!(
        fs::read_to_string(layout.live_marker("demo")).unwrap(),
        second.to_string()
    );

    // Same commit again is a no-op that keeps local additions
    fs::write(live.join("touched"), "1").unwrap();
    let live = materializer
        .refresh_live("demo", &second.to_string())
        .await
        .unwrap();
    assert!(live.join("touched").exists());
}

#[tokio::test]
async fn test_sweep_removes_aged_renders_and_dependencies() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let oid = commit_files(&repo, &[("index.html", "x")], "init");
    let commit = oid.to_string();

    let materializer = CommitMaterializer::new(layout.clone());
    let render = materializer.ensure("demo", &commit).await.unwrap();
    fs::create_dir_all(layout.node_modules_dir("demo", &commit)).unwrap();

    assert!(materializer
        .sweep_renders(Duration::from_secs(3600))
        .await
        .is_empty());
    assert!(render.exists());

    let removed = materializer.sweep_renders(Duration::ZERO).await;
    assert_eq!(removed.len(), 1);
    assert!(!layout.render_dir("demo", &commit).exists());
    assert!(!layout.dependency_dir("demo", &commit).exists());
}

#[tokio::test]
async fn test_reused_render_is_not_swept() {
    let temp = TempDir::new().unwrap();
    let (layout, repo) = setup_site(&temp, "demo");
    let commit = commit_files(&repo, &[("index.html", "x")], "init").to_string();

    let materializer = CommitMaterializer::new(layout.clone());
    let render = materializer.ensure("demo", &commit).await.unwrap();
    let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
    fs::File::open(&render)
        .unwrap()
        .set_modified(two_hours_ago)
        .unwrap();

    // Still in use: the next request refreshes its age
    materializer.ensure("demo", &commit).await.unwrap();
    assert!(materializer
        .sweep_renders(Duration::from_secs(3600))
        .await
        .is_empty());
    assert!(render.exists());

    // Unused past the cutoff: swept
    fs::File::open(&render)
        .unwrap()
        .set_modified(two_hours_ago)
        .unwrap();
    let removed = materializer.sweep_renders(Duration::from_secs(3600)).await;
    assert_eq!(removed.len(), 1);
}
