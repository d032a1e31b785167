// ABOUTME: Error types for commit materialization
// ABOUTME: Wraps git and filesystem causes with the (site, commit) being materialized

use plinth_core::{PathGuardError, ValidationError};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Site repository not found: {site}")]
    SiteNotFound { site: String },

    #[error("Failed to materialize {site}@{commit}: {source}")]
    MaterializationFailed {
        site: String,
        commit: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    InvalidId(#[from] ValidationError),

    #[error(transparent)]
    PathEscape(#[from] PathGuardError),
}

impl MaterializeError {
    pub(crate) fn failed(site: &str, commit: &str, source: impl Into<BoxError>) -> Self {
        MaterializeError::MaterializationFailed {
            site: site.to_string(),
            commit: commit.to_string(),
            source: source.into(),
        }
    }
}
