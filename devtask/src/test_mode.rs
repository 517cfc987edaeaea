//! Test runner delegation with watch-mode selection.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::config::{Env, Mode, TaskConfig};
use crate::core::state::{TaskMachine, TaskState};
use crate::core::watch::{WatchStrategy, choose_strategy, runner_args};
use crate::io::settings::load_settings;
use crate::io::test_runner::TestRunnerHandle;
use crate::io::vcs::is_under_version_control;
use crate::lifecycle::{Coordinator, RunOutcome};

/// Run the project's test runner with `args` and forward its exit code.
///
/// The version-control check only runs when neither an explicit
/// `--watchAll` flag nor CI mode settles the watch strategy.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_tests(root: &Path, env: &Env, args: &[String]) -> Result<RunOutcome> {
    let base = TaskConfig::new(Mode::Test, env);
    let strategy = strategy_for(root, &base, args);
    let config = TaskConfig {
        watch: strategy.is_watching(),
        ..base
    };
    let argv = runner_args(args, strategy);
    info!(?strategy, watch = config.watch, "test strategy chosen");

    let mut machine = TaskMachine::new(Mode::Test);
    let result = supervise(root, &config, &argv, &mut machine);
    if !machine.is_terminated() {
        machine.terminate();
    }
    result
}

/// Watch strategy for `args` in `root`.
pub fn strategy_for(root: &Path, config: &TaskConfig, args: &[String]) -> WatchStrategy {
    choose_strategy(args, config.ci_mode, || is_under_version_control(root))
}

fn supervise(
    root: &Path,
    config: &TaskConfig,
    argv: &[String],
    machine: &mut TaskMachine,
) -> Result<RunOutcome> {
    machine.advance(TaskState::Validating)?;
    let settings = load_settings(root)?;
    machine.advance(TaskState::Starting)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    // The runner owns stdin in watch mode; end-of-input is not a trigger here.
    let coordinator = {
        let _entered = runtime.enter();
        Coordinator::install(false)?
    };
    let outcome = runtime.block_on(coordinator.run(
        config,
        &mut *machine,
        |_| async { TestRunnerHandle::spawn(&settings.test.command, argv, root) },
        |runner| async move { runner.stop().await.map(|_| ()) },
    ));
    runtime.shutdown_background();
    outcome
}
