// ABOUTME: Per-(site, commit) npm dependency installation guarded by the install lock
// ABOUTME: Installs once per commit into dependencies/<site>/<commit>/node_modules

use crate::error::InstallError;
use crate::install_lock::InstallLock;
use crate::process::{run_captured, CaptureFailure};
use chrono::Utc;
use plinth_config::EngineConfig;
use plinth_core::{assert_contained, validate_commit_id, validate_site_id, Layout};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

const MANIFEST: &str = "package.json";
const LOCK_MANIFESTS: &[&str] = &["package-lock.json", "npm-shrinkwrap.json"];

#[derive(Debug, Clone)]
pub struct DependencyInstaller {
    layout: Layout,
    npm_binary: String,
    exec_path: String,
    install_timeout: Duration,
    output_limit: usize,
    lock_poll_interval: Duration,
    lock_acquire_timeout: Duration,
}

impl DependencyInstaller {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            layout: Layout::new(config.data_root.clone()),
            npm_binary: config.npm_binary.clone(),
            exec_path: config.exec_path.clone(),
            install_timeout: config.install_timeout,
            output_limit: config.output_limit_bytes,
            lock_poll_interval: config.lock_poll_interval,
            lock_acquire_timeout: config.lock_acquire_timeout,
        }
    }

    /// Return the dependency tree for `(site, commit)`, installing it first if
    /// the render has a manifest. `None` means there is nothing to install.
    pub async fn ensure(
        &self,
        site: &str,
        commit: &str,
        render_dir: &Path,
    ) -> Result<Option<PathBuf>, InstallError> {
        validate_site_id(site)?;
        validate_commit_id(commit)?;

        let node_modules = self.layout.node_modules_dir(site, commit);
        let marker = self.layout.install_marker(site, commit);
        // node_modules appears early in an install; only the marker means complete
        if is_file(&marker).await {
            return Ok(Some(node_modules));
        }

        let manifest = render_dir.join(MANIFEST);
        if !is_file(&manifest).await {
            return Ok(None);
        }
        assert_contained(render_dir, &manifest)?;

        let dep_dir = self.layout.dependency_dir(site, commit);
        fs::create_dir_all(&dep_dir)
            .await
            .map_err(|source| InstallError::Io {
                path: dep_dir.clone(),
                source,
            })?;

        let lock = InstallLock::acquire(
            &self.layout.install_lock(site, commit),
            self.lock_poll_interval,
            self.lock_acquire_timeout,
        )
        .await?;

        // Another waiter may have installed while we queued
        if is_file(&marker).await {
            debug!("Dependencies for {}@{} installed by another waiter", site, commit);
            lock.release().await?;
            return Ok(Some(node_modules));
        }

        // Leftover from an install whose process died before finishing
        remove_partial(&node_modules).await;

        let mut result = self.install(site, commit, render_dir, &dep_dir).await;
        if result.is_ok() {
            result = write_marker(&marker).await;
        }
        if result.is_err() {
            remove_partial(&node_modules).await;
        }
        lock.release().await?;
        result.map(|()| Some(node_modules))
    }

    async fn install(
        &self,
        site: &str,
        commit: &str,
        render_dir: &Path,
        dep_dir: &Path,
    ) -> Result<(), InstallError> {
        for name in std::iter::once(MANIFEST).chain(LOCK_MANIFESTS.iter().copied()) {
            let source = render_dir.join(name);
            if !source.is_file() {
                continue;
            }
            assert_contained(render_dir, &source)?;
            fs::copy(&source, dep_dir.join(name))
                .await
                .map_err(|e| InstallError::Io { path: source, source: e })?;
        }

        let cache = self.layout.npm_cache_dir();
        fs::create_dir_all(&cache)
            .await
            .map_err(|source| InstallError::Io {
                path: cache.clone(),
                source,
            })?;

        let mut command = Command::new(&self.npm_binary);
        command
            .args(["install", "--omit=dev", "--no-audit", "--no-fund", "--no-progress"])
            .arg("--cache")
            .arg(&cache)
            .current_dir(dep_dir)
            .env_clear()
            .env("PATH", &self.exec_path)
            .env("HOME", dep_dir)
            .env("CI", "true")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        info!("Installing dependencies for {}@{}", site, commit);
        let child = command.spawn().map_err(|source| InstallError::SpawnFailed {
            command: self.npm_binary.clone(),
            source,
        })?;

        match run_captured(child, None, self.install_timeout, self.output_limit).await {
            Ok(captured) if captured.status.success() => {
                let node_modules = dep_dir.join(plinth_core::constants::NODE_MODULES_DIR);
                // Manifests without dependencies leave no tree behind
                fs::create_dir_all(&node_modules)
                    .await
                    .map_err(|source| InstallError::Io {
                        path: node_modules.clone(),
                        source,
                    })?;
                info!("Installed dependencies for {}@{}", site, commit);
                Ok(())
            }
            Ok(captured) => {
                let stderr = String::from_utf8_lossy(&captured.stderr).into_owned();
                error!(
                    "npm install for {}@{} exited with {:?}: {}",
                    site,
                    commit,
                    captured.status.code(),
                    stderr.trim_end()
                );
                Err(InstallError::InstallFailed {
                    exit_code: captured.status.code(),
                    stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
                    stderr,
                })
            }
            Err(CaptureFailure::TimedOut { stdout, stderr }) => {
                error!(
                    "npm install for {}@{} timed out after {:?}",
                    site, commit, self.install_timeout
                );
                Err(InstallError::InstallTimeout {
                    timeout_secs: self.install_timeout.as_secs(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            }
            Err(CaptureFailure::LimitExceeded {
                stream,
                stdout,
                stderr,
            }) => {
                error!(
                    "npm install for {}@{} flooded {}, killed",
                    site, commit, stream
                );
                Err(InstallError::InstallFailed {
                    exit_code: None,
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            }
            Err(CaptureFailure::Io(source)) => Err(InstallError::Io {
                path: dep_dir.to_path_buf(),
                source,
            }),
        }
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn write_marker(marker: &Path) -> Result<(), InstallError> {
    fs::write(marker, Utc::now().to_rfc3339())
        .await
        .map_err(|source| InstallError::Io {
            path: marker.to_path_buf(),
            source,
        })
}

async fn remove_partial(node_modules: &Path) {
    match fs::remove_dir_all(node_modules).await {
        Ok(()) => warn!("Removed partial dependency tree {}", node_modules.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", node_modules.display(), e),
    }
}
