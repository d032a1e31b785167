// ABOUTME: Error types for script execution, install locking and dependency installation
// ABOUTME: Variants carry the context needed for server-side diagnostics

use crate::language::Language;
use plinth_core::{PathGuardError, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single sandboxed execution
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Language tag has no registered interpreter
    #[error("Unknown runtime: {tag}")]
    UnknownRuntime { tag: String },

    /// Interpreter switched off by configuration
    #[error("Runtime disabled: {language}")]
    RuntimeDisabled { language: Language },

    /// Working directory missing or not a directory
    #[error("Invalid working directory: {path}")]
    InvalidWorkingDirectory { path: PathBuf },

    /// Script does not resolve to a regular file
    #[error("Script not found: {path}")]
    ScriptNotFound { path: PathBuf },

    /// Working directory or script outside the execution roots
    #[error(transparent)]
    PathEscape(#[from] PathGuardError),

    /// Interpreter could not be started
    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Wall-clock limit reached; the process group was killed
    #[error("Execution timed out after {timeout_ms} ms")]
    ExecutionTimeout { timeout_ms: u64 },

    /// Output ceiling crossed; the process group was killed
    #[error("Execution exceeded the {limit} byte output limit on {stream}")]
    OutputLimitExceeded { stream: &'static str, limit: usize },

    /// Pipe failure while talking to the child
    #[error("I/O error during execution: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Timed out after {waited_ms} ms waiting for install lock {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Install lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    InvalidId(#[from] ValidationError),

    #[error(transparent)]
    PathEscape(#[from] PathGuardError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dependency install failed with exit code {exit_code:?}")]
    InstallFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Dependency install timed out after {timeout_secs} seconds")]
    InstallTimeout {
        timeout_secs: u64,
        stdout: String,
        stderr: String,
    },

    #[error("Install I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
