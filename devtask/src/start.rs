//! Long-running development server.
//!
//! Validation and port negotiation happen synchronously; only once a port is
//! leased does a tokio runtime come up to host the dev server, the optional
//! watch compiler and the shutdown triggers.

use std::path::Path;

use anyhow::{Context, Result};
use devtask_server::{DevServerHandle, DevServerOptions};
use tokio::process::Child;
use tracing::{debug, info, instrument, warn};

use crate::core::config::{Env, Mode, TaskConfig};
use crate::core::error::TaskError;
use crate::core::state::{TaskMachine, TaskState};
use crate::exit_codes;
use crate::io::paths::{ProjectPaths, check_required_files};
use crate::io::port::{PortLease, PortNegotiator};
use crate::io::process::{spawn_service, stop_child};
use crate::io::prompt::Prompter;
use crate::io::settings::{StartSettings, load_settings};
use crate::lifecycle::{Coordinator, RunOutcome, ServiceHandle};

/// Serve the project at `root` until a shutdown trigger arrives.
///
/// `prompter` is consulted when the preferred port is taken; pass `None`
/// when stdout is not a terminal. CI mode never prompts.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_start(root: &Path, env: &Env, prompter: Option<&dyn Prompter>) -> Result<RunOutcome> {
    let config = TaskConfig::new(Mode::Serve, env);
    let mut machine = TaskMachine::new(Mode::Serve);
    let result = serve_with(root, &config, prompter, &mut machine);
    if !machine.is_terminated() {
        machine.terminate();
    }
    result
}

fn serve_with(
    root: &Path,
    config: &TaskConfig,
    prompter: Option<&dyn Prompter>,
    machine: &mut TaskMachine,
) -> Result<RunOutcome> {
    machine.advance(TaskState::Validating)?;
    let settings = load_settings(root)?;
    let paths = ProjectPaths::new(root, &settings.paths);
    check_required_files(&paths.entries())?;

    machine.advance(TaskState::Negotiating)?;
    if config.host_from_env {
        println!(
            "Attempting to bind to HOST environment variable: {}\nIf this was unintentional, check that you haven't mistakenly set it in your shell.\n",
            config.host
        );
    }
    let negotiator = match prompter {
        Some(prompter) if !config.ci_mode => PortNegotiator::interactive(prompter),
        _ => PortNegotiator::non_interactive(),
    };
    let lease = negotiator.acquire(&config.host, config.preferred_port)?;
    debug!(port = lease.port, acquired_at = %lease.acquired_at, "port leased");

    machine.advance(TaskState::Starting)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let coordinator = {
        let _entered = runtime.enter();
        Coordinator::install(!config.ci_mode)?
    };
    let outcome = runtime.block_on(coordinator.run(
        config,
        &mut *machine,
        |config| start_services(config, &paths, &settings.start, &lease),
        DevServices::stop,
    ));
    runtime.shutdown_background();
    outcome
}

/// Dev server plus the optional watch compiler, supervised as one service.
pub struct DevServices {
    server: DevServerHandle,
    compiler: Option<Child>,
}

async fn start_services(
    config: &TaskConfig,
    paths: &ProjectPaths,
    start: &StartSettings,
    lease: &PortLease,
) -> Result<DevServices, TaskError> {
    println!("Starting the development server...\n");

    let mut options = DevServerOptions::new(&paths.html_entry, &paths.public_dir, &paths.src_dir);
    options.host = config.host.clone();
    options.port = lease.port;
    options.public_path = start.public_path.clone();
    if start.command.is_some() {
        options.output_dir = Some(paths.build_dir.clone());
    }
    let server = devtask_server::start(options)
        .await
        .map_err(|err| TaskError::ServiceStartError {
            service: "dev server",
            reason: format!("{err:#}"),
        })?;

    let compiler = match &start.command {
        Some(command) => {
            let node_env = config.mode.node_env();
            let envs = [("NODE_ENV", node_env), ("BABEL_ENV", node_env)];
            match spawn_service(command, &paths.root, &envs, false) {
                Ok(child) => Some(child),
                Err(err) => {
                    if let Err(stop_err) = server.stop().await {
                        warn!(err = %format!("{stop_err:#}"), "failed to stop dev server");
                    }
                    return Err(TaskError::ServiceStartError {
                        service: "watch compiler",
                        reason: format!("{err:#}"),
                    });
                }
            }
        }
        None => None,
    };

    println!(
        "You can now view the app in the browser.\n\n  Local:            {}\n",
        local_url(config, lease.port, &start.public_path)
    );
    info!(port = lease.port, compiler = compiler.is_some(), "development services started");
    Ok(DevServices { server, compiler })
}

impl DevServices {
    /// Stops the watch compiler, then the dev server.
    pub async fn stop(self) -> Result<()> {
        let Self { server, compiler } = self;
        if let Some(mut compiler) = compiler {
            stop_child(&mut compiler, "watch compiler").await?;
        }
        server.stop().await
    }
}

impl ServiceHandle for DevServices {
    async fn exited(&mut self) -> Result<i32> {
        let Self { server, compiler } = self;
        let Some(compiler) = compiler.as_mut() else {
            server.wait().await?;
            return Ok(exit_codes::FAILURE);
        };
        tokio::select! {
            served = server.wait() => {
                served?;
                Ok(exit_codes::FAILURE)
            }
            status = compiler.wait() => {
                let status = status.context("wait for watch compiler")?;
                warn!(exit_code = ?status.code(), "watch compiler exited");
                Ok(status.code().unwrap_or(exit_codes::FAILURE))
            }
        }
    }
}

/// URL printed for the operator. Wildcard and loopback hosts read as `localhost`.
pub fn local_url(config: &TaskConfig, port: u16, public_path: &str) -> String {
    let host = match config.host.as_str() {
        "0.0.0.0" | "::" | "127.0.0.1" | "::1" => "localhost",
        other => other,
    };
    format!("{}://{host}:{port}{public_path}", config.protocol())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedPrompter, TestProject};
    use std::net::TcpListener;

    #[test]
    fn local_url_uses_protocol_and_friendly_host() {
        let env = Env::from_pairs([("HTTPS", "true")]);
        let config = TaskConfig::new(Mode::Serve, &env);
        assert_eq!(local_url(&config, 3001, "/"), "https://localhost:3001/");

        let env = Env::from_pairs([("HOST", "dev.example.test")]);
        let config = TaskConfig::new(Mode::Serve, &env);
        assert_eq!(local_url(&config, 3000, "/app/"), "http://dev.example.test:3000/app/");
    }

    #[test]
    fn missing_entry_fails_before_negotiation() {
        let held = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = held.local_addr().expect("addr").port().to_string();
        let project = TestProject::empty().expect("project");
        project.write("src/index.js", "").expect("write");
        let prompter = ScriptedPrompter::new(vec![]);
        let env = Env::from_pairs([("PORT", port.as_str())]);

        let err = run_start(project.root(), &env, Some(&prompter)).expect_err("missing html");
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::MissingRequiredFiles(_))
        ));
        assert!(prompter.questions().is_empty());
    }

    #[test]
    fn busy_port_in_ci_fails_without_prompting() {
        let held = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = held.local_addr().expect("addr").port();
        let project = TestProject::new().expect("project");
        let prompter = ScriptedPrompter::new(vec![true]);
        let port_value = port.to_string();
        let env = Env::from_pairs([("PORT", port_value.as_str()), ("CI", "true")]);

        let err = run_start(project.root(), &env, Some(&prompter)).expect_err("port busy");
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::PortUnavailable { port: p, .. }) if *p == port
        ));
        assert!(prompter.questions().is_empty());
    }

    #[test]
    fn declined_alternate_port_fails() {
        let held = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = held.local_addr().expect("addr").port();
        let project = TestProject::new().expect("project");
        let prompter = ScriptedPrompter::new(vec![false]);
        let port_value = port.to_string();
        let env = Env::from_pairs([("PORT", port_value.as_str())]);

        let err = run_start(project.root(), &env, Some(&prompter)).expect_err("declined");
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::PortUnavailable { .. })
        ));
        assert_eq!(prompter.questions().len(), 1);
    }
}
