// ABOUTME: Maps a request path onto a file inside a render
// ABOUTME: Directory requests fall back to the first existing index file in a fixed order

use crate::error::EngineError;
use plinth_core::{assert_contained_in_any, join_relative};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index candidates in lookup order
pub const INDEX_FILES: &[&str] = &[
    "index.php",
    "index.html",
    "index.htm",
    "index.cjs",
    "index.mjs",
    "index.py",
    "index.sh",
    "index.lua",
];

/// A request path resolved against a render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Path relative to the render root
    pub relative: PathBuf,
    /// Contained real path of the file
    pub absolute: PathBuf,
}

/// Resolve `request_path` inside `base`.
///
/// `..` segments are rejected lexically, and the real path of every candidate must
/// stay inside one of `allowed` (normally just `base`; durable upload links
/// add the site's upload store).
pub fn resolve_target(
    base: &Path,
    allowed: &[PathBuf],
    request_path: &str,
) -> Result<ResolvedTarget, EngineError> {
    let relative = PathBuf::from(request_path.trim_start_matches('/'));
    let absolute = contained(base, allowed, &relative)?;

    if absolute.is_file() {
        return Ok(ResolvedTarget { relative, absolute });
    }

    if absolute.is_dir() {
        for name in INDEX_FILES {
            let candidate = relative.join(name);
            let resolved = contained(base, allowed, &candidate)?;
            if resolved.is_file() {
                debug!("Resolved '{}' to {}", request_path, candidate.display());
                return Ok(ResolvedTarget {
                    relative: candidate,
                    absolute: resolved,
                });
            }
        }
    }

    Err(EngineError::NotFound {
        path: request_path.to_string(),
    })
}

fn contained(base: &Path, allowed: &[PathBuf], relative: &Path) -> Result<PathBuf, EngineError> {
    let joined = join_relative(base, relative)?;
    Ok(assert_contained_in_any(allowed, &joined)?)
}
