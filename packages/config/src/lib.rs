// ABOUTME: Configuration for the Plinth engine
// ABOUTME: Environment variable names, parsing helpers and the validated EngineConfig

pub mod constants;
pub mod env;
pub mod settings;

pub use settings::{ConfigError, EngineConfig, InterpreterSettings, RuntimeSettings};
