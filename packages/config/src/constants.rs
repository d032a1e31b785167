// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names read by Plinth

// Data Root
pub const PLINTH_DATA_ROOT: &str = "PLINTH_DATA_ROOT";

// Script Execution
pub const PLINTH_EXEC_TIMEOUT_MS: &str = "PLINTH_EXEC_TIMEOUT_MS";
pub const PLINTH_OUTPUT_LIMIT_BYTES: &str = "PLINTH_OUTPUT_LIMIT_BYTES";
pub const PLINTH_EXEC_PATH: &str = "PLINTH_EXEC_PATH";

// Runtime Toggles
pub const PLINTH_ENABLE_PHP: &str = "PLINTH_ENABLE_PHP";
pub const PLINTH_ENABLE_NODE: &str = "PLINTH_ENABLE_NODE";
pub const PLINTH_ENABLE_PYTHON: &str = "PLINTH_ENABLE_PYTHON";
pub const PLINTH_ENABLE_BASH: &str = "PLINTH_ENABLE_BASH";
pub const PLINTH_ENABLE_LUA: &str = "PLINTH_ENABLE_LUA";

// Interpreter Binaries
pub const PLINTH_PHP_BINARY: &str = "PLINTH_PHP_BINARY";
pub const PLINTH_NODE_BINARY: &str = "PLINTH_NODE_BINARY";
pub const PLINTH_PYTHON_BINARY: &str = "PLINTH_PYTHON_BINARY";
pub const PLINTH_BASH_BINARY: &str = "PLINTH_BASH_BINARY";
pub const PLINTH_LUA_BINARY: &str = "PLINTH_LUA_BINARY";

// Dependency Installation
pub const PLINTH_NPM_BINARY: &str = "PLINTH_NPM_BINARY";
pub const PLINTH_INSTALL_TIMEOUT_SECS: &str = "PLINTH_INSTALL_TIMEOUT_SECS";
pub const PLINTH_LOCK_POLL_MS: &str = "PLINTH_LOCK_POLL_MS";
pub const PLINTH_LOCK_TIMEOUT_SECS: &str = "PLINTH_LOCK_TIMEOUT_SECS";

// Maintenance
pub const PLINTH_RENDER_MAX_AGE_HOURS: &str = "PLINTH_RENDER_MAX_AGE_HOURS";

// System Environment Variables
pub const HOME: &str = "HOME";
pub const PATH: &str = "PATH";
