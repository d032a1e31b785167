// ABOUTME: Request pipeline for Plinth sites
// ABOUTME: Materializes a commit, resolves the target file, then serves it statically or runs it as a script

pub mod engine;
pub mod error;
pub mod index;
pub mod request;
pub mod static_files;

pub use engine::Engine;
pub use error::EngineError;
pub use request::{RenderTarget, SiteRequest, SiteResponse};
