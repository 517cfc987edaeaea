//! `devtask`: build, serve and test a browser application.
//!
//! Each subcommand validates the project layout, launches the delegated tool
//! (bundler, dev server or test runner) and maps the result to a stable exit
//! code.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use devtask::build::{BuildOptions, run_build};
use devtask::core::config::Env;
use devtask::core::error::TaskError;
use devtask::exit_codes;
use devtask::io::bundler::CommandBundler;
use devtask::io::prompt::{Prompter, TerminalPrompter};
use devtask::logging;
use devtask::start::run_start;
use devtask::test_mode::run_tests;

#[derive(Parser)]
#[command(
    name = "devtask",
    version,
    about = "Build, serve and test a browser application"
)]
struct Cli {
    /// Project root containing `public/`, `src/` and optional `devtask.toml`.
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an optimized production build.
    Build {
        /// Also write the bundler's stats to `<build>/bundle-stats.json`.
        #[arg(long)]
        stats: bool,
    },
    /// Run the development server until interrupted.
    Start,
    /// Run the test runner; remaining arguments are passed through.
    Test {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let env = Env::capture();
    let root = cli.project_dir;
    match cli.command {
        Command::Build { stats } => {
            let options = BuildOptions { write_stats: stats };
            let mut stdout = std::io::stdout().lock();
            run_build(&root, &env, &options, &CommandBundler, &mut stdout)?;
            Ok(exit_codes::OK)
        }
        Command::Start => {
            let terminal = TerminalPrompter;
            let prompter: Option<&dyn Prompter> = if std::io::stdout().is_terminal() {
                Some(&terminal)
            } else {
                None
            };
            Ok(run_start(&root, &env, prompter)?.exit_code)
        }
        Command::Test { args } => Ok(run_tests(&root, &env, &args)?.exit_code),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<TaskError>()
        .map(TaskError::exit_code)
        .unwrap_or(exit_codes::FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_build_with_stats() {
        let cli = Cli::parse_from(["devtask", "build", "--stats"]);
        assert!(matches!(cli.command, Command::Build { stats: true }));
        assert_eq!(cli.project_dir, PathBuf::from("."));
    }

    #[test]
    fn parse_project_dir_after_subcommand() {
        let cli = Cli::parse_from(["devtask", "start", "--project-dir", "app"]);
        assert!(matches!(cli.command, Command::Start));
        assert_eq!(cli.project_dir, PathBuf::from("app"));
    }

    #[test]
    fn test_args_pass_through() {
        let cli = Cli::parse_from(["devtask", "test", "--watchAll=false", "--coverage", "App"]);
        match cli.command {
            Command::Test { args } => {
                assert_eq!(args, vec!["--watchAll=false", "--coverage", "App"]);
            }
            _ => panic!("expected test command"),
        }
    }

    #[test]
    fn task_errors_map_to_failure() {
        let err: anyhow::Error = TaskError::CompileError("boom".to_string()).into();
        assert_eq!(exit_code_for(&err), exit_codes::FAILURE);
        assert_eq!(exit_code_for(&anyhow::anyhow!("io")), exit_codes::FAILURE);
    }
}
