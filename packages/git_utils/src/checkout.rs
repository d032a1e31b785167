// ABOUTME: Blocking git2 checkout of a single commit's tree into an arbitrary directory
// ABOUTME: Leaves the source repository's HEAD, index and working tree untouched

use crate::error::BoxError;
use git2::build::CheckoutBuilder;
use git2::Repository;
use std::path::Path;
use tracing::debug;

/// Write the tree of `commit` into `target`, creating it if needed.
///
/// The checkout is detached: no ref moves and the repository index is not
/// updated. `commit` is resolved with rev-parse, so abbreviated hashes work.
pub fn checkout_commit(repo_dir: &Path, commit: &str, target: &Path) -> Result<(), BoxError> {
    let repo = Repository::open(repo_dir)?;
    let resolved = repo.revparse_single(commit)?.peel_to_commit()?;
    let tree = resolved.tree()?;

    std::fs::create_dir_all(target)?;

    let mut builder = CheckoutBuilder::new();
    builder
        .target_dir(target)
        .force()
        .recreate_missing(true)
        .update_index(false);
    repo.checkout_tree(tree.as_object(), Some(&mut builder))?;

    debug!(
        "Checked out {} ({}) from {} into {}",
        commit,
        resolved.id(),
        repo_dir.display(),
        target.display()
    );
    Ok(())
}

/// Whether `dir` opens as a git repository
pub fn is_repository(dir: &Path) -> bool {
    Repository::open(dir).is_ok()
}
