// ABOUTME: Git integration for turning (site, commit) pairs into materialized directories
// ABOUTME: Detached tree checkouts into staging directories, live refresh and render sweeping

pub mod checkout;
pub mod error;
pub mod materializer;

pub use error::MaterializeError;
pub use materializer::CommitMaterializer;
