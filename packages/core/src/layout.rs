// ABOUTME: Deterministic on-disk layout for sites, renders, dependencies and durable stores
// ABOUTME: Every component derives its paths from a single data root through this type

use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths derived from the Plinth data root.
///
/// Callers are expected to validate `site` and `commit` with
/// [`crate::validation`] before asking for a path; the layout itself only
/// joins segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sites_root(&self) -> PathBuf {
        self.root.join(SITES_DIR)
    }

    pub fn renders_root(&self) -> PathBuf {
        self.root.join(RENDERS_DIR)
    }

    pub fn live_root(&self) -> PathBuf {
        self.root.join(LIVE_DIR)
    }

    pub fn dependencies_root(&self) -> PathBuf {
        self.root.join(DEPENDENCIES_DIR)
    }

    pub fn npm_cache_dir(&self) -> PathBuf {
        self.root.join(NPM_CACHE_DIR)
    }

    /// Version-controlled working tree of a site
    pub fn site_dir(&self, site: &str) -> PathBuf {
        self.sites_root().join(site)
    }

    /// Parent of all renders of one site
    pub fn site_renders_dir(&self, site: &str) -> PathBuf {
        self.renders_root().join(site)
    }

    /// Render directory for one (site, commit)
    pub fn render_dir(&self, site: &str, commit: &str) -> PathBuf {
        self.site_renders_dir(site).join(commit)
    }

    /// Live materialization of a site
    pub fn live_dir(&self, site: &str) -> PathBuf {
        self.live_root().join(site)
    }

    /// Marker recording which commit `live/<site>` currently holds
    pub fn live_marker(&self, site: &str) -> PathBuf {
        self.live_root().join(format!(".{}.commit", site))
    }

    pub fn dependency_dir(&self, site: &str, commit: &str) -> PathBuf {
        self.dependencies_root().join(site).join(commit)
    }

    pub fn node_modules_dir(&self, site: &str, commit: &str) -> PathBuf {
        self.dependency_dir(site, commit).join(NODE_MODULES_DIR)
    }

    pub fn install_lock(&self, site: &str, commit: &str) -> PathBuf {
        self.dependency_dir(site, commit).join(INSTALL_LOCK_FILE)
    }

    /// Marker whose presence means `node_modules` is complete
    pub fn install_marker(&self, site: &str, commit: &str) -> PathBuf {
        self.dependency_dir(site, commit).join(INSTALL_COMPLETE_FILE)
    }

    /// Durable database store of a site
    pub fn live_data_dir(&self, site: &str) -> PathBuf {
        self.root.join(LIVE_DATA_DIR).join(site)
    }

    /// Durable secret store of a site
    pub fn secrets_dir(&self, site: &str) -> PathBuf {
        self.root.join(SECRETS_DIR).join(site)
    }

    pub fn secret_file(&self, site: &str) -> PathBuf {
        self.secrets_dir(site).join(SECRET_FILE_NAME)
    }

    /// Durable upload store of a site
    pub fn uploads_dir(&self, site: &str) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(site)
    }

    /// Roots scripts and working directories may live under
    pub fn execution_roots(&self) -> Vec<PathBuf> {
        vec![self.sites_root(), self.renders_root(), self.live_root()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_dependency_paths() {
        let layout = Layout::new("/data");
        assert_eq!(
            layout.render_dir("demo", "abc123"),
            PathBuf::from("/data/renders/demo/abc123")
        );
        assert_eq!(
            layout.node_modules_dir("demo", "abc123"),
            PathBuf::from("/data/dependencies/demo/abc123/node_modules")
        );
        assert_eq!(
            layout.install_lock("demo", "abc123"),
            PathBuf::from("/data/dependencies/demo/abc123/.lock")
        );
    }

    #[test]
    fn test_durable_store_paths() {
        let layout = Layout::new("/data");
        assert_eq!(layout.live_data_dir("demo"), PathBuf::from("/data/live-data/demo"));
        assert_eq!(layout.secret_file("demo"), PathBuf::from("/data/secrets/demo/.env"));
        assert_eq!(layout.uploads_dir("demo"), PathBuf::from("/data/uploads/demo"));
        assert_eq!(layout.live_marker("demo"), PathBuf::from("/data/live/.demo.commit"));
    }

    #[test]
    fn test_execution_roots_exclude_durable_stores() {
        let layout = Layout::new("/data");
        let roots = layout.execution_roots();
        assert!(roots.contains(&PathBuf::from("/data/sites")));
        assert!(roots.contains(&PathBuf::from("/data/renders")));
        assert!(!roots.iter().any(|r| r.ends_with("secrets")));
    }
}
