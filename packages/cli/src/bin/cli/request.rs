// ABOUTME: CLI command that runs a single request through the engine
// ABOUTME: Writes the response body to stdout and the status line and headers to stderr

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;
use http::Method;
use plinth_engine::{Engine, RenderTarget, SiteRequest};
use std::io::Write;
use std::path::PathBuf;

#[derive(Args)]
pub struct RequestArgs {
    /// Site identifier
    pub site: String,
    /// Full or abbreviated commit hash
    pub commit: String,
    /// Path below the site root
    #[arg(default_value = "/")]
    pub path: String,
    /// Serve from the live tree instead of an immutable render
    #[arg(long)]
    pub live: bool,
    /// HTTP method passed to scripts
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,
    /// Query string without the leading '?'
    #[arg(long, default_value = "")]
    pub query: String,
    /// Content type of the request body
    #[arg(long, default_value = "application/x-www-form-urlencoded")]
    pub content_type: String,
    /// File whose contents become the request body
    #[arg(long)]
    pub body_file: Option<PathBuf>,
}

impl RequestArgs {
    fn into_request(self) -> Result<SiteRequest> {
        let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method '{}'", self.method))?;
        let target = if self.live {
            RenderTarget::Live(self.commit)
        } else {
            RenderTarget::Commit(self.commit)
        };

        let mut request = SiteRequest::new(self.site, target, self.path)
            .with_method(method)
            .with_query(self.query);
        if let Some(path) = self.body_file {
            let body = std::fs::read(&path)
                .with_context(|| format!("Failed to read body file {}", path.display()))?;
            request = request.with_body(self.content_type, body);
        }
        Ok(request)
    }
}

pub async fn handle_request_command(engine: &Engine, args: RequestArgs) -> Result<()> {
    let request = args.into_request()?;

    match engine.handle(request).await {
        Ok(response) => {
            eprintln!("{}", response.status.to_string().green().bold());
            for (name, value) in &response.headers {
                eprintln!("{}: {}", name.cyan(), value);
            }
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
            Ok(())
        }
        Err(e) => {
            // Full detail is already in the log; show what a client would see
            bail!("{} {}", e.status_code().as_u16(), e.public_message())
        }
    }
}
