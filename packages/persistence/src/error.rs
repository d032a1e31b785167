// ABOUTME: Error types for durable artifact reconciliation
// ABOUTME: Per-file failures carry the path involved so they can be logged and skipped

use plinth_core::{PathGuardError, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    InvalidSite(#[from] ValidationError),

    #[error(transparent)]
    PathEscape(#[from] PathGuardError),

    #[error("{operation} failed for {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A directory occupies the artifact path {path}")]
    OccupiedByDirectory { path: PathBuf },

    #[error("Symbolic links are not supported on this platform")]
    LinksUnsupported,
}

impl PersistenceError {
    pub(crate) fn io(operation: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| PersistenceError::Io {
            operation,
            path,
            source,
        }
    }
}
