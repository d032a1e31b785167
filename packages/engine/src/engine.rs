// ABOUTME: Orchestrates one site request from materialization to response
// ABOUTME: Link durable state, install dependencies, execute, promote, then parse CGI output

use crate::error::EngineError;
use crate::index::{resolve_target, ResolvedTarget};
use crate::request::{RenderTarget, SiteRequest, SiteResponse};
use crate::static_files::serve_file;
use plinth_config::EngineConfig;
use plinth_core::constants::UPLOADS_DIR;
use plinth_core::{validate_commit_id, validate_site_id, Layout, PathGuard};
use plinth_git_utils::CommitMaterializer;
use plinth_persistence::PersistenceReconciler;
use plinth_runtime::{
    parse_cgi_output, DependencyInstaller, ExecutionRequest, Language, RuntimeSandbox,
};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    layout: Layout,
    guard: PathGuard,
    materializer: CommitMaterializer,
    reconciler: PersistenceReconciler,
    installer: DependencyInstaller,
    sandbox: RuntimeSandbox,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let layout = Layout::new(config.data_root.clone());
        Self {
            guard: PathGuard::new(layout.execution_roots()),
            materializer: CommitMaterializer::new(layout.clone()),
            reconciler: PersistenceReconciler::new(layout.clone()),
            installer: DependencyInstaller::new(&config),
            sandbox: RuntimeSandbox::new(config.clone()),
            layout,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn materializer(&self) -> &CommitMaterializer {
        &self.materializer
    }

    /// Materialize the requested tree and return its contained path
    pub async fn render_dir(&self, site: &str, target: &RenderTarget) -> Result<PathBuf, EngineError> {
        validate_site_id(site)?;
        validate_commit_id(target.commit())?;

        let dir = match target {
            RenderTarget::Commit(commit) => self.materializer.ensure(site, commit).await?,
            RenderTarget::Live(commit) => self.materializer.refresh_live(site, commit).await?,
        };
        Ok(self.guard.check(&dir)?)
    }

    /// Remove renders older than the configured maximum age
    pub async fn sweep(&self, max_age: Option<Duration>) -> Vec<PathBuf> {
        let max_age = max_age.unwrap_or(self.config.render_max_age);
        self.materializer.sweep_renders(max_age).await
    }

    pub async fn handle(&self, request: SiteRequest) -> Result<SiteResponse, EngineError> {
        let started = Instant::now();
        let result = self.dispatch(&request).await;
        match &result {
            Ok(response) => info!(
                "{} {} {} -> {} in {:?}",
                request.site,
                request.method,
                request.request_uri(),
                response.status.as_u16(),
                started.elapsed()
            ),
            Err(e) => warn!(
                "{} {} {} -> {}: {}",
                request.site,
                request.method,
                request.request_uri(),
                e.status_code().as_u16(),
                e
            ),
        }
        result
    }

    async fn dispatch(&self, request: &SiteRequest) -> Result<SiteResponse, EngineError> {
        let render_dir = self.render_dir(&request.site, &request.target).await?;
        let uploads = self.layout.uploads_dir(&request.site);
        let allowed = [render_dir.clone(), uploads.clone()];

        let ResolvedTarget { relative, absolute } =
            match resolve_target(&render_dir, &allowed, &request.path) {
                Err(EngineError::NotFound { .. }) if uploads.is_dir() => {
                    return self.serve_upload(&uploads, &request.path).await;
                }
                other => other?,
            };

        let language = relative
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Language::from_extension);

        match language {
            Some(language) => {
                self.run_script(request, language, &render_dir, &relative)
                    .await
            }
            None => serve_file(&relative, &absolute).await,
        }
    }

    /// Uploads not yet linked into this render are read from the durable store
    async fn serve_upload(&self, uploads: &Path, request_path: &str) -> Result<SiteResponse, EngineError> {
        let not_found = || EngineError::NotFound {
            path: request_path.to_string(),
        };
        let relative = Path::new(request_path.trim_start_matches('/'));
        let mut components = relative.components();
        if components.next() != Some(Component::Normal(OsStr::new(UPLOADS_DIR))) {
            return Err(not_found());
        }
        let rest = components.as_path();
        if rest.as_os_str().is_empty() {
            return Err(not_found());
        }

        let target = resolve_target(uploads, &[uploads.to_path_buf()], &rest.to_string_lossy())
            .map_err(|e| match e {
                EngineError::NotFound { .. } => not_found(),
                other => other,
            })?;
        serve_file(&Path::new(UPLOADS_DIR).join(&target.relative), &target.absolute).await
    }

    async fn run_script(
        &self,
        request: &SiteRequest,
        language: Language,
        render_dir: &Path,
        relative: &Path,
    ) -> Result<SiteResponse, EngineError> {
        let site = request.site.as_str();
        self.link_durable(site, render_dir).await;

        let mut execution = ExecutionRequest::new(language.tag(), render_dir, relative)
            .for_site(site)
            .with_env("REQUEST_METHOD", request.method.as_str())
            .with_env("REQUEST_URI", request.request_uri())
            .with_env("QUERY_STRING", request.query.clone())
            .with_env(
                "CONTENT_TYPE",
                request.content_type.clone().unwrap_or_default(),
            );
        if !request.body.is_empty() {
            execution = execution
                .with_env("CONTENT_LENGTH", request.body.len().to_string())
                .with_stdin(request.body.clone());
        }

        if language == Language::Node {
            let commit = request.target.commit();
            if let Some(node_modules) = self.installer.ensure(site, commit, render_dir).await? {
                execution = execution.with_env("NODE_PATH", node_modules.display().to_string());
            }
        }

        let result = self.sandbox.execute(execution).await;
        // Files created before a failure still must not live only in the render
        self.promote_durable(site, render_dir).await;
        let output = result?;

        if !output.success() {
            error!(
                "{} exited with {:?}: {}",
                relative.display(),
                output.exit_code,
                output.stderr_lossy().trim_end()
            );
            if output.stdout.is_empty() {
                return Err(EngineError::ScriptFailed {
                    exit_code: output.exit_code,
                });
            }
        } else if !output.stderr.is_empty() {
            debug!(
                "{} stderr: {}",
                relative.display(),
                output.stderr_lossy().trim_end()
            );
        }

        let cgi = parse_cgi_output(&output.stdout);
        Ok(SiteResponse {
            status: cgi.status,
            headers: cgi.headers,
            body: cgi.body,
        })
    }

    async fn link_durable(&self, site: &str, render_dir: &Path) {
        let reconciler = self.reconciler.clone();
        let site_owned = site.to_string();
        let dir = render_dir.to_path_buf();
        match tokio::task::spawn_blocking(move || reconciler.link_all(&site_owned, &dir)).await {
            Ok(Ok(report)) if report.failed > 0 => {
                warn!("{} durable artifacts could not be linked for {}", report.failed, site)
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Linking durable artifacts for {} failed: {}", site, e),
            Err(e) => error!("Link task for {} failed: {}", site, e),
        }
    }

    async fn promote_durable(&self, site: &str, render_dir: &Path) {
        let reconciler = self.reconciler.clone();
        let site_owned = site.to_string();
        let dir = render_dir.to_path_buf();
        match tokio::task::spawn_blocking(move || reconciler.promote_all(&site_owned, &dir)).await
        {
            Ok(Ok(report)) if report.failed > 0 => {
                warn!("{} new artifacts could not be promoted for {}", report.failed, site)
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Promoting artifacts for {} failed: {}", site, e),
            Err(e) => error!("Promote task for {} failed: {}", site, e),
        }
    }
}
