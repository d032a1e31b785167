// ABOUTME: Engine configuration loaded from environment variables
// ABOUTME: Timeouts, output ceilings, runtime toggles and the data root, validated with safe defaults

use crate::constants::*;
use crate::env::{non_empty_env, parse_bool_env, parse_env_or_default_with_validation};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LOCK_POLL_MS: u64 = 250;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_RENDER_MAX_AGE_HOURS: u64 = 24 * 7;
pub const DEFAULT_EXEC_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine data root: set PLINTH_DATA_ROOT or HOME")]
    NoDataRoot,
    #[error("Data root must be an absolute path: {0}")]
    RelativeDataRoot(PathBuf),
}

/// Per-interpreter switch and optional binary override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterSettings {
    pub enabled: bool,
    pub binary: Option<String>,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: None,
        }
    }
}

impl InterpreterSettings {
    fn from_env(enable_var: &str, binary_var: &str) -> Self {
        Self {
            enabled: parse_bool_env(enable_var, true),
            binary: non_empty_env(binary_var),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub php: InterpreterSettings,
    pub node: InterpreterSettings,
    pub python: InterpreterSettings,
    pub bash: InterpreterSettings,
    pub lua: InterpreterSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_root: PathBuf,
    pub exec_timeout: Duration,
    pub output_limit_bytes: usize,
    pub exec_path: String,
    pub runtimes: RuntimeSettings,
    pub npm_binary: String,
    pub install_timeout: Duration,
    pub lock_poll_interval: Duration,
    pub lock_acquire_timeout: Duration,
    pub render_max_age: Duration,
}

impl EngineConfig {
    /// Defaults rooted at `data_root`, without reading the environment
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            exec_timeout: Duration::from_millis(DEFAULT_EXEC_TIMEOUT_MS),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            exec_path: DEFAULT_EXEC_PATH.to_string(),
            runtimes: RuntimeSettings::default(),
            npm_binary: "npm".to_string(),
            install_timeout: Duration::from_secs(DEFAULT_INSTALL_TIMEOUT_SECS),
            lock_poll_interval: Duration::from_millis(DEFAULT_LOCK_POLL_MS),
            lock_acquire_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            render_max_age: Duration::from_secs(DEFAULT_RENDER_MAX_AGE_HOURS * 3600),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let data_root = match non_empty_env(PLINTH_DATA_ROOT) {
            Some(root) => PathBuf::from(root),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoDataRoot)?
                .join(".plinth"),
        };
        if !data_root.is_absolute() {
            return Err(ConfigError::RelativeDataRoot(data_root));
        }

        let exec_timeout_ms = parse_env_or_default_with_validation(
            PLINTH_EXEC_TIMEOUT_MS,
            DEFAULT_EXEC_TIMEOUT_MS,
            |v| (100..=600_000).contains(&v),
        );
        let output_limit_bytes = parse_env_or_default_with_validation(
            PLINTH_OUTPUT_LIMIT_BYTES,
            DEFAULT_OUTPUT_LIMIT_BYTES,
            |v| (1024..=1024 * 1024 * 1024).contains(&v),
        );
        let install_timeout_secs = parse_env_or_default_with_validation(
            PLINTH_INSTALL_TIMEOUT_SECS,
            DEFAULT_INSTALL_TIMEOUT_SECS,
            |v| (1..=3600).contains(&v),
        );
        let lock_poll_ms = parse_env_or_default_with_validation(
            PLINTH_LOCK_POLL_MS,
            DEFAULT_LOCK_POLL_MS,
            |v| (10..=10_000).contains(&v),
        );
        let mut lock_timeout_secs = parse_env_or_default_with_validation(
            PLINTH_LOCK_TIMEOUT_SECS,
            DEFAULT_LOCK_TIMEOUT_SECS,
            |v| (1..=86_400).contains(&v),
        );
        // A waiter may be queued behind a full install
        if lock_timeout_secs < install_timeout_secs {
            warn!(
                "{} ({}s) is shorter than {} ({}s), raising it to match",
                PLINTH_LOCK_TIMEOUT_SECS,
                lock_timeout_secs,
                PLINTH_INSTALL_TIMEOUT_SECS,
                install_timeout_secs
            );
            lock_timeout_secs = install_timeout_secs;
        }
        let render_max_age_hours = parse_env_or_default_with_validation(
            PLINTH_RENDER_MAX_AGE_HOURS,
            DEFAULT_RENDER_MAX_AGE_HOURS,
            |v| v >= 1,
        );

        let config = Self {
            data_root,
            exec_timeout: Duration::from_millis(exec_timeout_ms),
            output_limit_bytes,
            exec_path: non_empty_env(PLINTH_EXEC_PATH)
                .unwrap_or_else(|| DEFAULT_EXEC_PATH.to_string()),
            runtimes: RuntimeSettings {
                php: InterpreterSettings::from_env(PLINTH_ENABLE_PHP, PLINTH_PHP_BINARY),
                node: InterpreterSettings::from_env(PLINTH_ENABLE_NODE, PLINTH_NODE_BINARY),
                python: InterpreterSettings::from_env(PLINTH_ENABLE_PYTHON, PLINTH_PYTHON_BINARY),
                bash: InterpreterSettings::from_env(PLINTH_ENABLE_BASH, PLINTH_BASH_BINARY),
                lua: InterpreterSettings::from_env(PLINTH_ENABLE_LUA, PLINTH_LUA_BINARY),
            },
            npm_binary: non_empty_env(PLINTH_NPM_BINARY).unwrap_or_else(|| "npm".to_string()),
            install_timeout: Duration::from_secs(install_timeout_secs),
            lock_poll_interval: Duration::from_millis(lock_poll_ms),
            lock_acquire_timeout: Duration::from_secs(lock_timeout_secs),
            render_max_age: Duration::from_secs(render_max_age_hours * 3600),
        };

        debug!("Loaded engine config: {:?}", config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            PLINTH_DATA_ROOT,
            PLINTH_EXEC_TIMEOUT_MS,
            PLINTH_OUTPUT_LIMIT_BYTES,
            PLINTH_INSTALL_TIMEOUT_SECS,
            PLINTH_LOCK_TIMEOUT_SECS,
            PLINTH_ENABLE_LUA,
            PLINTH_PHP_BINARY,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_env() {
        clear_env();
        std::env::set_var(PLINTH_DATA_ROOT, "/srv/plinth");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/plinth"));
        assert_eq!(config.exec_timeout, Duration::from_millis(DEFAULT_EXEC_TIMEOUT_MS));
        assert_eq!(config.output_limit_bytes, DEFAULT_OUTPUT_LIMIT_BYTES);
        assert!(config.runtimes.php.enabled);
        assert!(config.lock_acquire_timeout > config.install_timeout);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides_and_validation() {
        clear_env();
        std::env::set_var(PLINTH_DATA_ROOT, "/srv/plinth");
        std::env::set_var(PLINTH_EXEC_TIMEOUT_MS, "1500");
        std::env::set_var(PLINTH_OUTPUT_LIMIT_BYTES, "12");
        std::env::set_var(PLINTH_ENABLE_LUA, "false");
        std::env::set_var(PLINTH_PHP_BINARY, "/opt/php/bin/php-cgi");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.exec_timeout, Duration::from_millis(1500));
        // Below the accepted floor, falls back to the default
        assert_eq!(config.output_limit_bytes, DEFAULT_OUTPUT_LIMIT_BYTES);
        assert!(!config.runtimes.lua.enabled);
        assert_eq!(
            config.runtimes.php.binary.as_deref(),
            Some("/opt/php/bin/php-cgi")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_lock_timeout_never_shorter_than_install() {
        clear_env();
        std::env::set_var(PLINTH_DATA_ROOT, "/srv/plinth");
        std::env::set_var(PLINTH_INSTALL_TIMEOUT_SECS, "900");
        std::env::set_var(PLINTH_LOCK_TIMEOUT_SECS, "60");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.lock_acquire_timeout, Duration::from_secs(900));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_relative_data_root_rejected() {
        clear_env();
        std::env::set_var(PLINTH_DATA_ROOT, "relative/root");
        assert!(matches!(
            EngineConfig::from_env(),
            Err(ConfigError::RelativeDataRoot(_))
        ));
        clear_env();
    }
}
