// ABOUTME: Directory names that make up the Plinth data root
// ABOUTME: Centralized so every package agrees on where renders, locks and durable stores live

/// Live version-controlled working trees, one per site
pub const SITES_DIR: &str = "sites";

/// Materialized commits: `renders/<site>/<commit>`
pub const RENDERS_DIR: &str = "renders";

/// Materialization of the live commit: `live/<site>`
pub const LIVE_DIR: &str = "live";

/// Per-commit dependency trees: `dependencies/<site>/<commit>/node_modules`
pub const DEPENDENCIES_DIR: &str = "dependencies";

/// Package manager cache shared by all installs
pub const NPM_CACHE_DIR: &str = "npm-cache";

/// Durable database files: `live-data/<site>`
pub const LIVE_DATA_DIR: &str = "live-data";

/// Durable secret files: `secrets/<site>/.env`
pub const SECRETS_DIR: &str = "secrets";

/// Durable uploaded files: `uploads/<site>`
pub const UPLOADS_DIR: &str = "uploads";

/// Name of the install marker file inside a dependency directory
pub const INSTALL_LOCK_FILE: &str = ".lock";

/// Written beside `node_modules` only after an install exits successfully
pub const INSTALL_COMPLETE_FILE: &str = ".installed";

/// Name of the dependency tree inside a dependency directory
pub const NODE_MODULES_DIR: &str = "node_modules";

/// Reserved filename for per-site secrets
pub const SECRET_FILE_NAME: &str = ".env";

/// Directories never descended into when walking site trees
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "bower_components",
    "vendor",
    "__pycache__",
    ".venv",
];
