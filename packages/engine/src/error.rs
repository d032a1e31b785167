// ABOUTME: Engine error taxonomy and its mapping onto HTTP status codes
// ABOUTME: Public messages are generic; filesystem detail only ever reaches the logs

use http::StatusCode;
use plinth_core::{PathGuardError, ValidationError};
use plinth_git_utils::MaterializeError;
use plinth_runtime::{InstallError, RuntimeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    InvalidId(#[from] ValidationError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    PathEscape(#[from] PathGuardError),

    #[error("No file for request path '{path}'")]
    NotFound { path: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("Script exited with {exit_code:?} and produced no output")]
    ScriptFailed { exit_code: Option<i32> },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidId(_) => StatusCode::BAD_REQUEST,
            EngineError::PathEscape(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Materialize(e) => match e {
                MaterializeError::SiteNotFound { .. } => StatusCode::NOT_FOUND,
                MaterializeError::InvalidId(_) => StatusCode::BAD_REQUEST,
                MaterializeError::PathEscape(_) => StatusCode::FORBIDDEN,
                MaterializeError::MaterializationFailed { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            EngineError::Runtime(e) => match e {
                RuntimeError::PathEscape(_) | RuntimeError::RuntimeDisabled { .. } => {
                    StatusCode::FORBIDDEN
                }
                RuntimeError::ScriptNotFound { .. }
                | RuntimeError::InvalidWorkingDirectory { .. } => StatusCode::NOT_FOUND,
                RuntimeError::UnknownRuntime { .. } => StatusCode::NOT_IMPLEMENTED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            EngineError::Install(e) => match e {
                InstallError::InvalidId(_) => StatusCode::BAD_REQUEST,
                InstallError::PathEscape(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            EngineError::ScriptFailed { .. } | EngineError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to clients
    pub fn public_message(&self) -> &'static str {
        match self {
            EngineError::Runtime(RuntimeError::ExecutionTimeout { .. }) => {
                "Script execution timed out"
            }
            EngineError::Runtime(RuntimeError::OutputLimitExceeded { .. }) => {
                "Script produced too much output"
            }
            _ => self
                .status_code()
                .canonical_reason()
                .unwrap_or("Request failed"),
        }
    }
}
