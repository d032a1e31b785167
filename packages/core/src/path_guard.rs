// ABOUTME: Path containment guard called before any filesystem access
// ABOUTME: Resolves real (symlink-followed) paths and rejects anything outside the declared roots

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("Path escapes allowed roots: {path}")]
    PathEscape { path: PathBuf },

    #[error("Root directory is not accessible: {root}")]
    RootUnavailable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to resolve path {path}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PathGuardError {
    fn escape(path: &Path) -> Self {
        PathGuardError::PathEscape {
            path: path.to_path_buf(),
        }
    }
}

/// Resolve `path` through the real filesystem.
///
/// Existing paths are canonicalized. For a path that does not exist yet the
/// deepest existing ancestor is canonicalized and the remaining components are
/// appended lexically. A dangling symlink anywhere in the missing tail has no
/// knowable target and is reported as an escape.
fn resolve_real(path: &Path) -> Result<PathBuf, PathGuardError> {
    let mut missing: Vec<&std::ffi::OsStr> = Vec::new();
    let mut current = path;

    let mut resolved = loop {
        match current.canonicalize() {
            Ok(real) => break real,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if std::fs::symlink_metadata(current).is_ok() {
                    warn!("Dangling symlink in path: {}", path.display());
                    return Err(PathGuardError::escape(path));
                }
                match (current.parent(), current.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name);
                        current = if parent.as_os_str().is_empty() {
                            Path::new(".")
                        } else {
                            parent
                        };
                    }
                    // `..` as the last component or a bare root that does not exist
                    _ => return Err(PathGuardError::escape(path)),
                }
            }
            Err(e) => {
                return Err(PathGuardError::Unresolvable {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    };

    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Fail with `PathEscape` unless `candidate` resolves to `root` or a descendant.
///
/// Returns the resolved candidate so callers open exactly what was checked.
pub fn assert_contained(root: &Path, candidate: &Path) -> Result<PathBuf, PathGuardError> {
    let real_root = root
        .canonicalize()
        .map_err(|e| PathGuardError::RootUnavailable {
            root: root.to_path_buf(),
            source: e,
        })?;
    let real_candidate = resolve_real(candidate)?;

    if real_candidate.starts_with(&real_root) {
        Ok(real_candidate)
    } else {
        warn!(
            "Rejected path outside root: {} -> {} (root {})",
            candidate.display(),
            real_candidate.display(),
            real_root.display()
        );
        Err(PathGuardError::escape(candidate))
    }
}

/// Succeed if any of `roots` contains `candidate`; fail only if none do.
///
/// Roots that do not exist are skipped rather than treated as errors.
pub fn assert_contained_in_any(
    roots: &[PathBuf],
    candidate: &Path,
) -> Result<PathBuf, PathGuardError> {
    let real_candidate = resolve_real(candidate)?;

    for root in roots {
        match root.canonicalize() {
            Ok(real_root) if real_candidate.starts_with(&real_root) => return Ok(real_candidate),
            Ok(_) => {}
            Err(e) => debug!("Skipping unavailable root {}: {}", root.display(), e),
        }
    }

    warn!(
        "Rejected path outside all {} allowed roots: {}",
        roots.len(),
        candidate.display()
    );
    Err(PathGuardError::escape(candidate))
}

/// Join a user-supplied relative path onto `root` and check containment.
///
/// Absolute paths and any `..` segment are rejected outright, before the
/// filesystem is consulted, even when the joined path would land inside.
pub fn resolve_relative(root: &Path, relative: &Path) -> Result<PathBuf, PathGuardError> {
    let joined = join_relative(root, relative)?;
    assert_contained(root, &joined)
}

/// Lexical half of [`resolve_relative`]: join without touching the filesystem.
///
/// Callers must still check the result with [`assert_contained`] or
/// [`assert_contained_in_any`].
pub fn join_relative(root: &Path, relative: &Path) -> Result<PathBuf, PathGuardError> {
    let mut joined = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!("Rejected relative path with traversal: {}", relative.display());
                return Err(PathGuardError::escape(relative));
            }
        }
    }
    Ok(joined)
}

/// Allow-list of roots that scripts and working directories must live under.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
}

impl PathGuard {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn check(&self, candidate: &Path) -> Result<PathBuf, PathGuardError> {
        assert_contained_in_any(&self.roots, candidate)
    }
}
