//! Failure taxonomy for task runs.
//!
//! These errors travel inside `anyhow::Error` and are downcast at the CLI
//! boundary to pick an exit code. A signal-triggered shutdown is a normal
//! outcome and has no variant here.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Pre-flight: an entry file the task depends on does not exist.
    #[error("could not find required file(s):\n{}", list_paths(.0))]
    MissingRequiredFiles(Vec<PathBuf>),

    /// No port could be leased on the requested host.
    #[error("port {port} on {host} is unavailable: {reason}")]
    PortUnavailable {
        host: String,
        port: u16,
        reason: String,
    },

    /// The bundler reported errors (or promoted warnings).
    #[error("failed to compile.\n\n{0}")]
    CompileError(String),

    /// A delegated service could not be constructed.
    #[error("failed to start {service}: {reason}")]
    ServiceStartError {
        service: &'static str,
        reason: String,
    },
}

impl TaskError {
    pub fn exit_code(&self) -> i32 {
        exit_codes::FAILURE
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}
