// ABOUTME: Keeps databases, secrets and uploads in durable per-site stores outside disposable renders
// ABOUTME: Links durable files into renders before execution and promotes new ones out afterwards

pub mod artifact;
pub mod error;
pub mod reconciler;
pub mod secrets;

pub use artifact::ArtifactClass;
pub use error::PersistenceError;
pub use reconciler::{LinkReport, PersistenceReconciler, PromoteReport};
pub use secrets::SecretStore;
