// ABOUTME: Request and response types exchanged with the HTTP layer
// ABOUTME: A request names a site, which tree to use, a relative path and the CGI-relevant request fields

use http::{Method, StatusCode};

/// Which materialization of a site a request runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// Immutable render of a specific commit
    Commit(String),
    /// The site's live tree, refreshed to the given live commit when it moved
    Live(String),
}

impl RenderTarget {
    pub fn commit(&self) -> &str {
        match self {
            RenderTarget::Commit(commit) | RenderTarget::Live(commit) => commit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteRequest {
    pub site: String,
    pub target: RenderTarget,
    /// Path below the render root, `/`-separated, already percent-decoded
    pub path: String,
    pub method: Method,
    pub query: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl SiteRequest {
    pub fn new(site: impl Into<String>, target: RenderTarget, path: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            target,
            path: path.into(),
            method: Method::GET,
            query: String::new(),
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }

    /// Path and query as the client sent them
    pub fn request_uri(&self) -> String {
        let path = format!("/{}", self.path.trim_start_matches('/'));
        if self.query.is_empty() {
            path
        } else {
            format!("{}?{}", path, self.query)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteResponse {
    pub status: StatusCode,
    /// Lower-cased header names
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SiteResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
