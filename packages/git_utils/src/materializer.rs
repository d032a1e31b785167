// ABOUTME: Materializes (site, commit) pairs into reusable render directories
// ABOUTME: Staging checkout plus atomic rename so readers never observe a partial render

use crate::checkout::{checkout_commit, is_repository};
use crate::error::{BoxError, MaterializeError};
use plinth_core::{assert_contained, validate_commit_id, validate_site_id, Layout};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reused renders get their mtime bumped at most this often
const TOUCH_INTERVAL: Duration = Duration::from_secs(60);

type KeyLocks = HashMap<(String, String), Arc<Mutex<()>>>;

/// Turns (site, commit) pairs into directories holding that commit's tree.
///
/// Renders are immutable once present and are returned without revalidation.
/// Identical concurrent requests in this process are serialized per key; a
/// racing process loses the final rename and adopts the winner's directory.
#[derive(Clone)]
pub struct CommitMaterializer {
    layout: Layout,
    in_flight: Arc<Mutex<KeyLocks>>,
}

impl CommitMaterializer {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Return the render directory for `(site, commit)`, checking it out on first use.
    pub async fn ensure(&self, site: &str, commit: &str) -> Result<PathBuf, MaterializeError> {
        validate_site_id(site)?;
        validate_commit_id(commit)?;

        let render_dir = self.layout.render_dir(site, commit);
        if let Ok(meta) = fs::metadata(&render_dir).await {
            let render = self.contained_render(&render_dir)?;
            if meta.modified().is_ok_and(is_stale_touch) {
                touch(&render).await;
            }
            return Ok(render);
        }

        let site_dir = self.site_repository(site).await?;

        let key_lock = self.key_lock(site, commit).await;
        let result = {
            let _held = key_lock.lock().await;
            self.materialize_locked(site, commit, &site_dir, &render_dir)
                .await
        };
        self.release_key(site, commit, key_lock).await;

        result?;
        self.contained_render(&render_dir)
    }

    async fn materialize_locked(
        &self,
        site: &str,
        commit: &str,
        site_dir: &Path,
        render_dir: &Path,
    ) -> Result<(), MaterializeError> {
        // Another waiter may have finished while we queued
        if fs::metadata(render_dir).await.is_ok() {
            return Ok(());
        }

        let parent = self.layout.site_renders_dir(site);
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| MaterializeError::failed(site, commit, e))?;

        let staging = parent.join(format!(".{}.partial-{}", commit, Uuid::new_v4().simple()));
        info!("Materializing {}@{} into {}", site, commit, render_dir.display());

        if let Err(e) = run_checkout(site_dir, commit, &staging).await {
            error!("Checkout of {}@{} failed: {}", site, commit, e);
            remove_dir_quietly(&staging).await;
            return Err(MaterializeError::failed(site, commit, e));
        }

        match fs::rename(&staging, render_dir).await {
            Ok(()) => {
                info!("Materialized {}@{}", site, commit);
                Ok(())
            }
            Err(e) => {
                let raced = fs::metadata(render_dir).await.is_ok();
                remove_dir_quietly(&staging).await;
                if raced {
                    debug!(
                        "Render {}@{} appeared concurrently ({}), discarded staging copy",
                        site, commit, e
                    );
                    Ok(())
                } else {
                    error!("Failed to publish render {}@{}: {}", site, commit, e);
                    Err(MaterializeError::failed(site, commit, e))
                }
            }
        }
    }

    /// Point `live/<site>` at `commit`, re-materializing only when it changed.
    ///
    /// The previous tree is moved aside before the new one is renamed in, so
    /// there is a brief window in which `live/<site>` is absent.
    pub async fn refresh_live(&self, site: &str, commit: &str) -> Result<PathBuf, MaterializeError> {
        validate_site_id(site)?;
        validate_commit_id(commit)?;

        let live_dir = self.layout.live_dir(site);
        let marker = self.layout.live_marker(site);
        let site_dir = self.site_repository(site).await?;

        let key_lock = self.key_lock(site, "live").await;
        let result = {
            let _held = key_lock.lock().await;
            self.refresh_live_locked(site, commit, &site_dir, &live_dir, &marker)
                .await
        };
        self.release_key(site, "live", key_lock).await;

        result?;
        Ok(assert_contained(&self.layout.live_root(), &live_dir)?)
    }

    async fn refresh_live_locked(
        &self,
        site: &str,
        commit: &str,
        site_dir: &Path,
        live_dir: &Path,
        marker: &Path,
    ) -> Result<(), MaterializeError> {
        let current = fs::read_to_string(marker).await.ok();
        let live_exists = fs::metadata(live_dir).await.is_ok();
        if live_exists && current.as_deref().map(str::trim) == Some(commit) {
            debug!("Live tree for {} already at {}", site, commit);
            return Ok(());
        }

        let live_root = self.layout.live_root();
        fs::create_dir_all(&live_root)
            .await
            .map_err(|e| MaterializeError::failed(site, commit, e))?;

        let token = Uuid::new_v4().simple().to_string();
        let staging = live_root.join(format!(".{}.partial-{}", site, token));
        if let Err(e) = run_checkout(site_dir, commit, &staging).await {
            error!("Live checkout of {}@{} failed: {}", site, commit, e);
            remove_dir_quietly(&staging).await;
            return Err(MaterializeError::failed(site, commit, e));
        }

        let retired = live_root.join(format!(".{}.retired-{}", site, token));
        if live_exists {
            if let Err(e) = fs::rename(live_dir, &retired).await {
                remove_dir_quietly(&staging).await;
                return Err(MaterializeError::failed(site, commit, e));
            }
        }

        if let Err(e) = fs::rename(&staging, live_dir).await {
            // Put the previous tree back rather than leave the site dark
            if live_exists {
                if let Err(restore) = fs::rename(&retired, live_dir).await {
                    error!("Failed to restore live tree for {}: {}", site, restore);
                }
            }
            remove_dir_quietly(&staging).await;
            return Err(MaterializeError::failed(site, commit, e));
        }

        let marker_tmp = live_root.join(format!(".{}.commit-{}", site, token));
        let write_marker = async {
            fs::write(&marker_tmp, commit).await?;
            fs::rename(&marker_tmp, marker).await
        };
        if let Err(e) = write_marker.await {
            warn!("Failed to record live commit for {}: {}", site, e);
        }

        if live_exists {
            remove_dir_quietly(&retired).await;
        }
        info!("Live tree for {} now at {}", site, commit);
        Ok(())
    }

    /// Remove renders (and abandoned staging directories) older than `max_age`.
    ///
    /// Age is the directory mtime, which `ensure` refreshes whenever it reuses
    /// a render, so only renders unused for `max_age` are removed.
    ///
    /// Dependency trees of removed renders are reclaimed too unless an install
    /// lock is present. Returns the removed render paths.
    pub async fn sweep_renders(&self, max_age: Duration) -> Vec<PathBuf> {
        let layout = self.layout.clone();
        match tokio::task::spawn_blocking(move || sweep_blocking(&layout, max_age)).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Render sweep task failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn site_repository(&self, site: &str) -> Result<PathBuf, MaterializeError> {
        let site_dir = self.layout.site_dir(site);
        let repo_dir = site_dir.clone();
        let is_repo = tokio::task::spawn_blocking(move || is_repository(&repo_dir))
            .await
            .unwrap_or(false);
        if !is_repo {
            warn!("No repository for site {} at {}", site, site_dir.display());
            return Err(MaterializeError::SiteNotFound {
                site: site.to_string(),
            });
        }
        Ok(site_dir)
    }

    fn contained_render(&self, render_dir: &Path) -> Result<PathBuf, MaterializeError> {
        Ok(assert_contained(&self.layout.renders_root(), render_dir)?)
    }

    async fn key_lock(&self, site: &str, commit: &str) -> Arc<Mutex<()>> {
        let mut locks = self.in_flight.lock().await;
        locks
            .entry((site.to_string(), commit.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_key(&self, site: &str, commit: &str, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.in_flight.lock().await;
        // One reference in the map, one held by us: nobody else is waiting
        if Arc::strong_count(&key_lock) <= 2 {
            locks.remove(&(site.to_string(), commit.to_string()));
        }
    }
}

async fn run_checkout(site_dir: &Path, commit: &str, target: &Path) -> Result<(), BoxError> {
    let site_dir = site_dir.to_path_buf();
    let commit = commit.to_string();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || checkout_commit(&site_dir, &commit, &target)).await?
}

async fn remove_dir_quietly(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn is_stale_touch(modified: SystemTime) -> bool {
    modified
        .elapsed()
        .map(|age| age >= TOUCH_INTERVAL)
        .unwrap_or(false)
}

async fn touch(render: &Path) {
    let path = render.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::open(&path).and_then(|dir| dir.set_modified(SystemTime::now()))
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Could not refresh mtime of {}: {}", render.display(), e),
        Err(e) => debug!("Touch task for {} failed: {}", render.display(), e),
    }
}

fn is_older_than(path: &Path, cutoff: SystemTime) -> bool {
    std::fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| modified <= cutoff)
        .unwrap_or(false)
}

fn sweep_blocking(layout: &Layout, max_age: Duration) -> Vec<PathBuf> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = Vec::new();

    let Ok(sites) = std::fs::read_dir(layout.renders_root()) else {
        return removed;
    };

    for site_entry in sites.flatten() {
        if !site_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let site = site_entry.file_name().to_string_lossy().to_string();
        let Ok(renders) = std::fs::read_dir(site_entry.path()) else {
            continue;
        };

        for render in renders.flatten() {
            let path = render.path();
            if !is_older_than(&path, cutoff) {
                continue;
            }
            let name = render.file_name().to_string_lossy().to_string();

            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("Failed to sweep {}: {}", path.display(), e);
                continue;
            }

            if name.starts_with('.') {
                debug!("Swept abandoned staging directory {}", path.display());
                continue;
            }

            info!("Swept render {}@{}", site, name);
            let deps = layout.dependency_dir(&site, &name);
            if deps.exists() && !layout.install_lock(&site, &name).exists() {
                if let Err(e) = std::fs::remove_dir_all(&deps) {
                    warn!("Failed to sweep dependencies {}: {}", deps.display(), e);
                }
            }
            removed.push(path);
        }
    }

    removed
}
