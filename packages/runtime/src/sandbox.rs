// ABOUTME: Runs a script under its interpreter with a minimal CGI-shaped environment
// ABOUTME: Enforces execution-root containment, a wall-clock timeout and a per-stream output ceiling

use crate::error::RuntimeError;
use crate::language::Language;
use crate::process::{run_captured, CaptureFailure};
use plinth_config::EngineConfig;
use plinth_core::{resolve_relative, Layout, PathGuard};
use plinth_persistence::SecretStore;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Fields owned by the CGI protocol; secrets never override them
pub const PROTOCOL_FIELDS: &[&str] = &[
    "GATEWAY_INTERFACE",
    "SERVER_PROTOCOL",
    "SCRIPT_FILENAME",
    "SCRIPT_NAME",
    "DOCUMENT_ROOT",
    "REQUEST_METHOD",
    "REQUEST_URI",
    "QUERY_STRING",
    "CONTENT_TYPE",
    "CONTENT_LENGTH",
    "REDIRECT_STATUS",
];

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: String,
    pub working_dir: PathBuf,
    /// Script path relative to `working_dir`
    pub script: PathBuf,
    pub env: HashMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    /// Site whose secrets are exposed to the script
    pub site: Option<String>,
}

impl ExecutionRequest {
    pub fn new(
        language: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            language: language.into(),
            working_dir: working_dir.into(),
            script: script.into(),
            env: HashMap::new(),
            stdin: None,
            timeout: None,
            site: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn for_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawns interpreters against scripts inside the allowed execution roots.
///
/// Children never inherit the server environment, run in their own process
/// group and are killed when the returned future is dropped.
#[derive(Debug, Clone)]
pub struct RuntimeSandbox {
    config: EngineConfig,
    guard: PathGuard,
    secrets: SecretStore,
}

impl RuntimeSandbox {
    pub fn new(config: EngineConfig) -> Self {
        let layout = Layout::new(config.data_root.clone());
        Self {
            guard: PathGuard::new(layout.execution_roots()),
            secrets: SecretStore::new(layout),
            config,
        }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput, RuntimeError> {
        let language =
            Language::from_tag(&request.language).ok_or_else(|| RuntimeError::UnknownRuntime {
                tag: request.language.clone(),
            })?;
        if !language.settings(&self.config.runtimes).enabled {
            return Err(RuntimeError::RuntimeDisabled { language });
        }

        if !request.working_dir.is_dir() {
            return Err(RuntimeError::InvalidWorkingDirectory {
                path: request.working_dir.clone(),
            });
        }
        let working_dir = self.guard.check(&request.working_dir)?;

        let script = resolve_relative(&working_dir, &request.script)?;
        let script = self.guard.check(&script)?;
        if !script.is_file() {
            return Err(RuntimeError::ScriptNotFound { path: script });
        }

        let env = self.build_env(language, &request, &working_dir, &script);
        let binary = language.binary(&self.config.runtimes);

        let mut command = Command::new(&binary);
        command.args(language.fixed_args());
        if language.script_as_arg() {
            command.arg(&script);
        }
        command
            .current_dir(&working_dir)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let timeout = request.timeout.unwrap_or(self.config.exec_timeout);
        let limit = self.config.output_limit_bytes;
        debug!(
            "Executing {} {} in {} (timeout {:?})",
            binary,
            script.display(),
            working_dir.display(),
            timeout
        );

        let started = Instant::now();
        let child = command.spawn().map_err(|source| {
            warn!("Failed to spawn {}: {}", binary, source);
            RuntimeError::SpawnFailed {
                command: binary.clone(),
                source,
            }
        })?;

        match run_captured(child, request.stdin, timeout, limit).await {
            Ok(captured) => {
                let output = ExecutionOutput {
                    exit_code: captured.status.code(),
                    stdout: captured.stdout,
                    stderr: captured.stderr,
                    duration: started.elapsed(),
                };
                if output.success() {
                    debug!("{} finished in {:?}", script.display(), output.duration);
                } else {
                    info!(
                        "{} exited with {:?}: {}",
                        script.display(),
                        output.exit_code,
                        output.stderr_lossy().trim_end()
                    );
                }
                Ok(output)
            }
            Err(CaptureFailure::TimedOut { .. }) => {
                warn!("{} killed after {:?}", script.display(), timeout);
                Err(RuntimeError::ExecutionTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Err(CaptureFailure::LimitExceeded { stream, .. }) => {
                warn!("{} killed for flooding {}", script.display(), stream);
                Err(RuntimeError::OutputLimitExceeded { stream, limit })
            }
            Err(CaptureFailure::Io(e)) => Err(RuntimeError::Io(e)),
        }
    }

    fn build_env(
        &self,
        language: Language,
        request: &ExecutionRequest,
        working_dir: &Path,
        script: &Path,
    ) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), self.config.exec_path.clone());
        env.insert("HOME".to_string(), working_dir.display().to_string());
        env.extend(request.env.clone());

        if let Some(site) = &request.site {
            for (key, value) in self.secrets.load(site) {
                if PROTOCOL_FIELDS.contains(&key.as_str()) {
                    debug!("Secret {} for {} shadows a protocol field, ignored", key, site);
                    continue;
                }
                env.insert(key, value);
            }
        }

        if language.is_cgi() {
            let script_name = script_name(&request.script);
            let content_length = request
                .stdin
                .as_ref()
                .map(|body| body.len().to_string())
                .unwrap_or_default();
            let defaults = [
                ("GATEWAY_INTERFACE", "CGI/1.1".to_string()),
                ("SERVER_PROTOCOL", "HTTP/1.1".to_string()),
                ("SCRIPT_FILENAME", script.display().to_string()),
                ("SCRIPT_NAME", script_name.clone()),
                ("DOCUMENT_ROOT", working_dir.display().to_string()),
                ("REQUEST_METHOD", "GET".to_string()),
                ("REQUEST_URI", script_name),
                ("QUERY_STRING", String::new()),
                ("CONTENT_TYPE", String::new()),
                ("CONTENT_LENGTH", content_length),
                ("REDIRECT_STATUS", "200".to_string()),
            ];
            for (key, value) in defaults {
                let blank = env.get(key).map_or(true, |v| v.is_empty());
                if blank {
                    env.insert(key.to_string(), value);
                }
            }
        }

        env
    }
}

/// URL-style script name: `/` followed by the normal components of `relative`
fn script_name(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}
