// ABOUTME: Shared tree-walking helpers for site directories
// ABOUTME: Walks owned paths with pruning of version-control and dependency directories

use crate::constants::SKIPPED_DIRS;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// True for directory names that are never part of site content walks
pub fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

fn is_pruned(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(is_skipped_dir)
}

/// A non-directory entry found under a walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Absolute path of the entry
    pub path: PathBuf,
    /// Path relative to the walk root
    pub relative: PathBuf,
    /// Whether the entry itself is a symlink (links are not followed)
    pub is_symlink: bool,
}

/// Collect every file and symlink under `root`, skipping pruned directories.
///
/// Symlinks are reported but never followed. A missing root yields an empty
/// list; unreadable entries are logged and skipped.
pub fn walk_files(root: &Path) -> Vec<WalkedFile> {
    if !root.exists() {
        return Vec::new();
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_pruned(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        files.push(WalkedFile {
            relative: relative.to_path_buf(),
            is_symlink: file_type.is_symlink(),
            path: entry.into_path(),
        });
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_skips_git_and_node_modules() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(root.join(".git/objects/x.db"), "").unwrap();
        fs::write(root.join("node_modules/pkg/y.db"), "").unwrap();
        fs::write(root.join("data/app.db"), "").unwrap();
        fs::write(root.join("index.php"), "").unwrap();

        let files: Vec<PathBuf> = walk_files(root).into_iter().map(|f| f.relative).collect();
        assert_eq!(
            files,
            vec![PathBuf::from("data/app.db"), PathBuf::from("index.php")]
        );
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(walk_files(&temp.path().join("absent")).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_reports_symlinks_without_following() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(temp.path().join("elsewhere")).unwrap();
        fs::write(temp.path().join("elsewhere/inner.db"), "").unwrap();
        std::os::unix::fs::symlink(temp.path().join("elsewhere"), root.join("linked")).unwrap();

        let files = walk_files(&root);
        assert_eq!(files.len(), 1);
        assert!(files[0].is_symlink);
        assert_eq!(files[0].relative, PathBuf::from("linked"));
    }
}
