// ABOUTME: Cross-process advisory lock guarding one dependency directory
// ABOUTME: PID-stamped marker file created atomically; stale holders are reclaimed by waiters

use crate::error::LockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// How long an unreadable marker is given for its creator to finish writing it
const UNPARSEABLE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held install lock. Removed on [`InstallLock::release`] or when dropped.
///
/// Liveness of the recorded PID is checked with `sysinfo`, which is a
/// heuristic: a recycled PID makes a dead holder look alive until it exits.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
    released: bool,
}

impl InstallLock {
    /// Wait for the lock at `path`, polling every `poll_interval`.
    pub async fn acquire(
        path: &Path,
        poll_interval: Duration,
        acquire_timeout: Duration,
    ) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let started = Instant::now();
        loop {
            match try_create(path).await {
                Ok(()) => {
                    debug!("Acquired install lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if reclaim_if_stale(path).await {
                        continue;
                    }
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }

            let waited = started.elapsed();
            if waited >= acquire_timeout {
                warn!("Gave up waiting for install lock {}", path.display());
                return Err(LockError::LockTimeout {
                    path: path.to_path_buf(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        let removed = match fs::remove_file(&self.path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        };
        debug!("Released install lock {}", self.path.display());
        removed.map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for InstallLock {
    // Only reached on early exits and cancellation; drop cannot await
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = remove_marker(&self.path) {
                warn!("Failed to remove install lock {}: {}", self.path.display(), e);
            }
        }
    }
}

fn remove_marker(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Released dropped install lock {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let record = LockRecord {
        pid: std::process::id(),
        acquired_at: Utc::now(),
    };
    let body = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
    file.write_all(&body).await?;
    file.flush().await
}

/// Remove the marker if its holder is gone. Returns true when the caller
/// should retry immediately.
async fn reclaim_if_stale(path: &Path) -> bool {
    let contents = match fs::read(path).await {
        Ok(contents) => contents,
        // Released between our create attempt and this read
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(e) => {
            debug!("Cannot read install lock {}: {}", path.display(), e);
            return false;
        }
    };

    let stale = match serde_json::from_slice::<LockRecord>(&contents) {
        Ok(record) => {
            let alive = is_process_running(record.pid).await;
            if !alive {
                info!(
                    "Install lock {} held by dead process {} since {}",
                    path.display(),
                    record.pid,
                    record.acquired_at
                );
            }
            !alive
        }
        Err(_) => {
            let age = fs::metadata(path)
                .await
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            matches!(age, Some(age) if age > UNPARSEABLE_GRACE)
        }
    };
    if !stale {
        return false;
    }

    // Only remove the marker we judged; a new holder may have replaced it
    if fs::read(path).await.ok().as_deref() != Some(contents.as_slice()) {
        return true;
    }
    match remove_marker(path) {
        Ok(()) => {
            info!("Reclaimed stale install lock {}", path.display());
            true
        }
        Err(e) => {
            warn!("Failed to reclaim install lock {}: {}", path.display(), e);
            false
        }
    }
}

async fn is_process_running(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || {
        use sysinfo::{Pid, System};
        let mut system = System::new();
        system.refresh_processes();
        system.process(Pid::from_u32(pid)).is_some()
    })
    .await
    .unwrap_or(true)
}
