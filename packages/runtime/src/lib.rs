// ABOUTME: Script execution for Plinth renders under CGI-like semantics
// ABOUTME: Interpreter dispatch, bounded process capture, CGI parsing, install locking and npm installs

pub mod cgi;
pub mod deps;
pub mod error;
pub mod install_lock;
pub mod language;
pub mod process;
pub mod sandbox;

pub use cgi::{parse_cgi_output, CgiResponse};
pub use deps::DependencyInstaller;
pub use error::{InstallError, LockError, RuntimeError};
pub use install_lock::InstallLock;
pub use language::Language;
pub use sandbox::{ExecutionOutput, ExecutionRequest, RuntimeSandbox};
