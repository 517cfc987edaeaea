//! Delegated test runner process.

use std::path::Path;

use anyhow::Result;
use tokio::process::Child;
use tracing::{debug, info};

use crate::core::config::Mode;
use crate::core::error::TaskError;
use crate::exit_codes;
use crate::io::process::{spawn_service, stop_child};
use crate::lifecycle::ServiceHandle;

/// A running test runner. Owns the terminal's stdin so watch mode stays interactive.
#[derive(Debug)]
pub struct TestRunnerHandle {
    child: Child,
}

impl TestRunnerHandle {
    /// Spawn `command` followed by `args` in `workdir`.
    pub fn spawn(command: &[String], args: &[String], workdir: &Path) -> Result<Self, TaskError> {
        let mut argv = command.to_vec();
        argv.extend_from_slice(args);
        info!(argv = %argv.join(" "), "starting test runner");

        let node_env = Mode::Test.node_env();
        let envs = [
            ("NODE_ENV", node_env),
            ("BABEL_ENV", node_env),
            ("PUBLIC_URL", ""),
        ];
        let child = spawn_service(&argv, workdir, &envs, true).map_err(|err| {
            TaskError::ServiceStartError {
                service: "test runner",
                reason: format!("{err:#}"),
            }
        })?;
        Ok(Self { child })
    }

    /// Kill the runner if it is still going; returns its exit code if it had already finished.
    pub async fn stop(mut self) -> Result<Option<i32>> {
        stop_child(&mut self.child, "test runner").await
    }
}

impl ServiceHandle for TestRunnerHandle {
    async fn exited(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        debug!(exit_code = ?status.code(), "test runner exited");
        Ok(status.code().unwrap_or(exit_codes::FAILURE))
    }
}
