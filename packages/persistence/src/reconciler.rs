// ABOUTME: Links durable artifacts into renders and promotes newly created ones back out
// ABOUTME: Per-file failures are logged and counted so one bad artifact never blocks a request

use crate::artifact::ArtifactClass;
use crate::error::PersistenceError;
use chrono::Utc;
use plinth_core::constants::SECRET_FILE_NAME;
use plinth_core::{assert_contained, validate_site_id, Layout};
use std::fs;
use std::io::ErrorKind;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome counts of a link pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Links created where nothing existed
    pub created: usize,
    /// Snapshot files or stale links replaced by a link
    pub replaced: usize,
    /// Links already pointing at the durable copy
    pub unchanged: usize,
    pub failed: usize,
}

impl LinkReport {
    /// Number of filesystem changes made
    pub fn changes(&self) -> usize {
        self.created + self.replaced
    }
}

impl AddAssign for LinkReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.replaced += other.replaced;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

/// Outcome counts of a promotion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromoteReport {
    pub promoted: usize,
    pub failed: usize,
}

impl AddAssign for PromoteReport {
    fn add_assign(&mut self, other: Self) {
        self.promoted += other.promoted;
        self.failed += other.failed;
    }
}

enum LinkOutcome {
    Created,
    Replaced,
    Unchanged,
}

/// Bridges disposable render directories and the durable per-site stores.
///
/// All operations are blocking filesystem work; async callers should run
/// them on the blocking pool. Link and promote passes are not synchronized
/// with each other: two renders promoting the same relative path race and
/// the last writer wins.
#[derive(Debug, Clone)]
pub struct PersistenceReconciler {
    layout: Layout,
}

impl PersistenceReconciler {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Expose every durable file of `class` inside `target_dir` as a link.
    ///
    /// Durable storage is authoritative: a regular file at the same relative
    /// path is replaced. Links already pointing at the durable copy are left
    /// alone, so repeating the call changes nothing.
    pub fn link_into(
        &self,
        site: &str,
        target_dir: &Path,
        class: ArtifactClass,
    ) -> Result<LinkReport, PersistenceError> {
        validate_site_id(site)?;
        let target_dir = assert_contained(target_dir, target_dir)?;
        let durable_root = class.durable_root(&self.layout, site);
        let subtree = class.render_subtree(&target_dir);

        let mut report = LinkReport::default();
        for file in class.collect(&durable_root) {
            if file.is_symlink {
                debug!("Ignoring link inside durable store: {}", file.path.display());
                continue;
            }
            let dest = subtree.join(&file.relative);
            match link_one(&target_dir, &file.path, &dest) {
                Ok(LinkOutcome::Created) => report.created += 1,
                Ok(LinkOutcome::Replaced) => report.replaced += 1,
                Ok(LinkOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    warn!("Failed to link {} artifact {}: {}", class, dest.display(), e);
                    report.failed += 1;
                }
            }
        }

        if report.changes() > 0 || report.failed > 0 {
            info!(
                "Linked {} artifacts for {}: {} created, {} replaced, {} failed",
                class, site, report.created, report.replaced, report.failed
            );
        }
        Ok(report)
    }

    /// Move every new `class` file out of `source_dir` into durable storage,
    /// leaving a link behind.
    ///
    /// Files that are already links are skipped. An existing durable copy is
    /// overwritten; for secrets it is first backed up with a UTC timestamp.
    pub fn promote_from(
        &self,
        site: &str,
        source_dir: &Path,
        class: ArtifactClass,
    ) -> Result<PromoteReport, PersistenceError> {
        validate_site_id(site)?;
        let source_dir = assert_contained(source_dir, source_dir)?;
        let durable_root = class.durable_root(&self.layout, site);
        let subtree = class.render_subtree(&source_dir);

        let mut report = PromoteReport::default();
        for file in class.collect(&subtree) {
            if file.is_symlink {
                continue;
            }
            match promote_one(class, &source_dir, &durable_root, &file.path, &file.relative) {
                Ok(()) => report.promoted += 1,
                Err(e) => {
                    warn!(
                        "Failed to promote {} artifact {}: {}",
                        class,
                        file.path.display(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        if report.promoted > 0 || report.failed > 0 {
            info!(
                "Promoted {} artifacts for {}: {} moved, {} failed",
                class, site, report.promoted, report.failed
            );
        }
        Ok(report)
    }

    pub fn link_all(&self, site: &str, target_dir: &Path) -> Result<LinkReport, PersistenceError> {
        let mut total = LinkReport::default();
        for class in ArtifactClass::ALL {
            total += self.link_into(site, target_dir, class)?;
        }
        Ok(total)
    }

    pub fn promote_all(
        &self,
        site: &str,
        source_dir: &Path,
    ) -> Result<PromoteReport, PersistenceError> {
        let mut total = PromoteReport::default();
        for class in ArtifactClass::ALL {
            total += self.promote_from(site, source_dir, class)?;
        }
        Ok(total)
    }
}

fn link_one(target_root: &Path, durable: &Path, dest: &Path) -> Result<LinkOutcome, PersistenceError> {
    let parent = dest.parent().unwrap_or(target_root);
    assert_contained(target_root, parent)?;
    fs::create_dir_all(parent).map_err(PersistenceError::io("create directory", parent))?;
    // Re-check now that the parents exist on disk
    assert_contained(target_root, parent)?;

    let outcome = match fs::symlink_metadata(dest) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if fs::read_link(dest).ok().as_deref() == Some(durable) {
                return Ok(LinkOutcome::Unchanged);
            }
            fs::remove_file(dest).map_err(PersistenceError::io("remove stale link", dest))?;
            LinkOutcome::Replaced
        }
        Ok(meta) if meta.is_dir() => {
            return Err(PersistenceError::OccupiedByDirectory {
                path: dest.to_path_buf(),
            });
        }
        Ok(_) => {
            debug!("Replacing snapshot file {} with durable link", dest.display());
            fs::remove_file(dest).map_err(PersistenceError::io("remove snapshot file", dest))?;
            LinkOutcome::Replaced
        }
        Err(e) if e.kind() == ErrorKind::NotFound => LinkOutcome::Created,
        Err(e) => return Err(PersistenceError::io("inspect", dest)(e)),
    };

    make_link(durable, dest)?;
    Ok(outcome)
}

fn promote_one(
    class: ArtifactClass,
    source_root: &Path,
    durable_root: &Path,
    source: &Path,
    relative: &Path,
) -> Result<(), PersistenceError> {
    assert_contained(source_root, source)?;

    let durable = durable_root.join(relative);
    fs::create_dir_all(durable_root).map_err(PersistenceError::io("create directory", durable_root))?;
    assert_contained(durable_root, &durable)?;
    if let Some(parent) = durable.parent() {
        fs::create_dir_all(parent).map_err(PersistenceError::io("create directory", parent))?;
    }

    if class == ArtifactClass::Secret && durable.is_file() {
        let backup = backup_path(durable_root);
        fs::copy(&durable, &backup).map_err(PersistenceError::io("back up", &durable))?;
        info!("Backed up previous secret file to {}", backup.display());
    }

    move_file(source, &durable)?;
    make_link(&durable, source)?;
    debug!("Promoted {} to {}", source.display(), durable.display());
    Ok(())
}

fn backup_path(durable_root: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    durable_root.join(format!("{}.backup-{}", SECRET_FILE_NAME, stamp))
}

/// Rename, falling back to copy and remove when crossing filesystems
fn move_file(from: &Path, to: &Path) -> Result<(), PersistenceError> {
    if let Err(e) = fs::rename(from, to) {
        debug!(
            "Rename {} -> {} failed ({}), copying instead",
            from.display(),
            to.display(),
            e
        );
        fs::copy(from, to).map_err(PersistenceError::io("copy", from))?;
        fs::remove_file(from).map_err(PersistenceError::io("remove", from))?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_link(original: &Path, link: &Path) -> Result<(), PersistenceError> {
    std::os::unix::fs::symlink(original, link).map_err(PersistenceError::io("link", link))
}

#[cfg(not(unix))]
fn make_link(_original: &Path, _link: &Path) -> Result<(), PersistenceError> {
    Err(PersistenceError::LinksUnsupported)
}
