// ABOUTME: Validation of site and commit identifiers before they become path segments
// ABOUTME: Prevents traversal, separator and control-character injection into the layout

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid site id '{site}': {reason}")]
    InvalidSiteId { site: String, reason: String },

    #[error("Invalid commit id '{commit}': {reason}")]
    InvalidCommitId { commit: String, reason: String },
}

const MAX_SITE_ID_LEN: usize = 128;

/// Validates a site id for use as a single path segment.
///
/// Accepts ASCII alphanumerics, `-`, `_` and `.`, not starting with `.`.
///
/// ```
/// use plinth_core::validation::validate_site_id;
///
/// assert!(validate_site_id("demo").is_ok());
/// assert!(validate_site_id("../etc").is_err());
/// ```
pub fn validate_site_id(site: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidSiteId {
        site: site.escape_default().to_string(),
        reason: reason.to_string(),
    };

    if site.is_empty() {
        return Err(invalid("site id cannot be empty"));
    }
    if site.len() > MAX_SITE_ID_LEN {
        return Err(invalid("site id is too long"));
    }
    if site.contains("..") {
        return Err(invalid("contains path traversal sequence"));
    }
    if site.contains('/') || site.contains('\\') {
        return Err(invalid("contains path separator"));
    }
    if site.chars().any(|c| c.is_control()) {
        return Err(invalid("contains control characters"));
    }
    if site.starts_with('.') {
        return Err(invalid("cannot start with '.'"));
    }
    if !site
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(invalid(
            "can only contain alphanumeric characters, '-', '_' and '.'",
        ));
    }

    Ok(())
}

/// Validates a commit id: 4 to 64 hexadecimal characters.
pub fn validate_commit_id(commit: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidCommitId {
        commit: commit.escape_default().to_string(),
        reason: reason.to_string(),
    };

    if !(4..=64).contains(&commit.len()) {
        return Err(invalid("must be between 4 and 64 characters"));
    }
    if !commit.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("must be hexadecimal"));
    }

    Ok(())
}
