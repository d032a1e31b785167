// ABOUTME: Static file responses for non-script paths
// ABOUTME: Extension-derived content types and a nosniff header on every response

use crate::error::EngineError;
use crate::request::SiteResponse;
use http::StatusCode;
use plinth_persistence::ArtifactClass;
use std::path::{Component, Path};
use tracing::debug;

pub fn determine_content_type(file_path: &Path) -> &'static str {
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("wasm") => "application/wasm",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Hidden files and database artifacts are never served directly
pub fn is_servable(relative: &Path) -> bool {
    let hidden = relative.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    });
    !hidden && !ArtifactClass::Database.matches(relative)
}

pub async fn serve_file(relative: &Path, absolute: &Path) -> Result<SiteResponse, EngineError> {
    if !is_servable(relative) {
        debug!("Refusing to serve {}", relative.display());
        return Err(EngineError::NotFound {
            path: relative.display().to_string(),
        });
    }

    let body = tokio::fs::read(absolute)
        .await
        .map_err(|source| EngineError::Io {
            path: relative.display().to_string(),
            source,
        })?;

    Ok(SiteResponse {
        status: StatusCode::OK,
        headers: vec![
            (
                "content-type".to_string(),
                determine_content_type(relative).to_string(),
            ),
            ("x-content-type-options".to_string(), "nosniff".to_string()),
        ],
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_content_type() {
        assert_eq!(
            determine_content_type(Path::new("index.HTML")),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            determine_content_type(Path::new("app.js")),
            "application/javascript; charset=utf-8"
        );
        assert_eq!(determine_content_type(Path::new("logo.png")), "image/png");
        assert_eq!(
            determine_content_type(Path::new("blob")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_hidden_and_database_files_are_not_servable() {
        assert!(!is_servable(Path::new(".env")));
        assert!(!is_servable(Path::new(".git/config")));
        assert!(!is_servable(Path::new("data/app.sqlite")));
        assert!(is_servable(Path::new("assets/app.css")));
        assert!(is_servable(Path::new("uploads/me.png")));
    }
}
