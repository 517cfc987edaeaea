//! One-shot production build.
//!
//! Validates the entry files, prepares the build directory, runs the bundler
//! once and applies the message policy to its diagnostics. Runs on the
//! calling thread with no signal handling of its own.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::config::{Env, Mode, TaskConfig};
use crate::core::error::TaskError;
use crate::core::messages::{Verdict, evaluate, format_messages};
use crate::core::sizes::{self, AssetReport};
use crate::core::state::{TaskMachine, TaskState};
use crate::io::build_output::{collect_assets, copy_public, empty_dir, measure_file_sizes, write_stats};
use crate::io::bundler::{BundleRequest, Bundler};
use crate::io::paths::{ProjectPaths, check_required_files};
use crate::io::settings::load_settings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Write the bundler's stats document next to the build output.
    pub write_stats: bool,
}

/// How a build that did not hit a fatal error ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Compiled, possibly with warnings.
    Compiled {
        warnings: Vec<String>,
        assets: Vec<AssetReport>,
    },
    /// Compile failed but the compile-on-error override kept the exit code at 0.
    FailedAllowed { message: String },
}

/// Run a production build of the project at `root`.
///
/// Compile failures come back as [`TaskError::CompileError`] unless the
/// compile-on-error override is set. Operator output goes to `out`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_build(
    root: &Path,
    env: &Env,
    options: &BuildOptions,
    bundler: &dyn Bundler,
    out: &mut dyn Write,
) -> Result<BuildOutcome> {
    let config = TaskConfig::new(Mode::Build, env);
    let mut machine = TaskMachine::new(Mode::Build);
    let result = build_with(root, &config, options, bundler, out, &mut machine);
    if !machine.is_terminated() {
        machine.terminate();
    }
    result
}

fn build_with(
    root: &Path,
    config: &TaskConfig,
    options: &BuildOptions,
    bundler: &dyn Bundler,
    out: &mut dyn Write,
    machine: &mut TaskMachine,
) -> Result<BuildOutcome> {
    machine.advance(TaskState::Validating)?;
    let settings = load_settings(root)?;
    let paths = ProjectPaths::new(root, &settings.paths);
    check_required_files(&paths.entries())?;

    machine.advance(TaskState::Starting)?;
    let previous = measure_file_sizes(&paths.build_dir)?;
    debug!(assets = previous.len(), "measured previous build");
    empty_dir(&paths.build_dir)?;
    let copied = copy_public(&paths.public_dir, &paths.build_dir, &paths.html_entry)?;
    debug!(copied, "copied public assets");

    writeln!(out, "Creating an optimized production build...").context("write output")?;
    let request = BundleRequest {
        workdir: paths.root.clone(),
        command: settings.build.command.clone(),
        node_env: config.mode.node_env(),
        timeout: Duration::from_secs(settings.build.timeout_secs),
        output_limit_bytes: settings.build.output_limit_bytes,
    };
    machine.advance(TaskState::Running)?;
    let report = bundler.bundle(&request).context("run bundler")?;
    machine.advance(TaskState::ShuttingDown)?;

    let messages = format_messages(&report.errors, &report.warnings);
    let verdict = evaluate(messages, config.ci_mode);
    let outcome = match verdict {
        Verdict::Success { warnings } => {
            if options.write_stats {
                match &report.stats {
                    Some(stats) => write_stats(&paths.stats_path(), stats)?,
                    None => debug!("bundler produced no stats, nothing to write"),
                }
            }
            print_success(out, &warnings)?;
            let assets = sizes::report(&collect_assets(&paths.build_dir)?, &previous);
            print_file_sizes(out, &assets, &paths, &settings.paths.build_dir)?;
            info!(warnings = warnings.len(), "build compiled");
            BuildOutcome::Compiled { warnings, assets }
        }
        Verdict::Failed {
            message,
            warnings_as_errors,
        } => {
            if config.compile_on_error {
                writeln!(
                    out,
                    "Compiled with the following type errors (you may want to check these before deploying your app):\n\n{message}\n"
                )
                .context("write output")?;
                info!("compile failed, override keeps exit code 0");
                BuildOutcome::FailedAllowed { message }
            } else {
                if warnings_as_errors {
                    writeln!(
                        out,
                        "\nTreating warnings as errors because CI = true.\nMost CI servers set it automatically.\n"
                    )
                    .context("write output")?;
                }
                machine.advance(TaskState::Terminated)?;
                return Err(TaskError::CompileError(message).into());
            }
        }
    };
    machine.advance(TaskState::Terminated)?;
    Ok(outcome)
}

fn print_success(out: &mut dyn Write, warnings: &[String]) -> Result<()> {
    if warnings.is_empty() {
        writeln!(out, "Compiled successfully.\n").context("write output")?;
    } else {
        writeln!(out, "Compiled with warnings.\n\n{}\n", warnings.join("\n\n"))
            .context("write output")?;
        writeln!(
            out,
            "Search for the keywords to learn more about each warning.\n"
        )
        .context("write output")?;
    }
    Ok(())
}

fn print_file_sizes(
    out: &mut dyn Write,
    assets: &[AssetReport],
    paths: &ProjectPaths,
    build_label: &Path,
) -> Result<()> {
    if assets.is_empty() {
        return Ok(());
    }
    writeln!(out, "File sizes after gzip:\n").context("write output")?;
    let width = assets
        .iter()
        .map(|a| sizes::format_size(a.gzip_size).len() + sizes::format_delta(a.delta).len() + 1)
        .max()
        .unwrap_or(0);
    for asset in assets {
        let size = format!(
            "{} {}",
            sizes::format_size(asset.gzip_size),
            sizes::format_delta(asset.delta)
        );
        let marker = if asset.oversized { "  (large)" } else { "" };
        let growth = if asset.large_growth { "  (grew significantly)" } else { "" };
        writeln!(
            out,
            "  {size:<width$}  {}/{}{marker}{growth}",
            build_label.display(),
            asset.name
        )
        .context("write output")?;
    }
    if assets.iter().any(|a| a.oversized) {
        writeln!(
            out,
            "\nThe bundle size is significantly larger than recommended.\nConsider reducing it with code splitting."
        )
        .context("write output")?;
    }
    debug!(build_dir = %paths.build_dir.display(), "size report printed");
    writeln!(out).context("write output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bundler::BundleReport;
    use crate::io::settings::PathSettings;
    use crate::test_support::{ScriptedBundler, TestProject};
    use serde_json::json;

    fn run(
        project: &TestProject,
        env: &Env,
        options: BuildOptions,
        report: BundleReport,
    ) -> (Result<BuildOutcome>, String, ScriptedBundler) {
        let bundler = ScriptedBundler::new(vec![report]);
        let mut out = Vec::new();
        let result = run_build(project.root(), env, &options, &bundler, &mut out);
        (result, String::from_utf8_lossy(&out).into_owned(), bundler)
    }

    #[test]
    fn clean_compile_succeeds_without_stats_file() {
        let project = TestProject::new().expect("project");
        let report = BundleReport {
            stats: Some(json!({"errors": [], "warnings": []})),
            ..BundleReport::default()
        };
        let (result, out, bundler) =
            run(&project, &Env::default(), BuildOptions::default(), report);

        let outcome = result.expect("build");
        assert!(matches!(outcome, BuildOutcome::Compiled { ref warnings, .. } if warnings.is_empty()));
        assert!(out.contains("Compiled successfully."));
        assert_eq!(bundler.calls(), 1);
        assert!(!project.path("build/bundle-stats.json").exists());
    }

    #[test]
    fn stats_flag_writes_stats_document() {
        let project = TestProject::new().expect("project");
        let report = BundleReport {
            stats: Some(json!({"hash": "abc", "errors": [], "warnings": []})),
            ..BundleReport::default()
        };
        let options = BuildOptions { write_stats: true };
        let (result, _, _) = run(&project, &Env::default(), options, report);
        result.expect("build");

        let written = std::fs::read_to_string(project.path("build/bundle-stats.json"))
            .expect("stats file");
        assert!(written.contains("\"hash\": \"abc\""));
    }

    #[test]
    fn only_the_first_error_is_reported() {
        let project = TestProject::new().expect("project");
        let report = BundleReport {
            errors: vec!["first problem".to_string(), "second problem".to_string()],
            ..BundleReport::default()
        };
        let (result, _, _) = run(&project, &Env::default(), BuildOptions::default(), report);

        let err = result.expect_err("compile fails");
        assert_eq!(
            err.downcast_ref::<TaskError>(),
            Some(&TaskError::CompileError("first problem".to_string()))
        );
        assert!(!format!("{err:#}").contains("second problem"));
    }

    #[test]
    fn compile_on_error_override_succeeds() {
        let project = TestProject::new().expect("project");
        let env = Env::from_pairs([("TSC_COMPILE_ON_ERROR", "true")]);
        let report = BundleReport {
            errors: vec!["TS2322: nope".to_string()],
            ..BundleReport::default()
        };
        let (result, out, _) = run(&project, &env, BuildOptions::default(), report);

        assert_eq!(
            result.expect("override"),
            BuildOutcome::FailedAllowed {
                message: "TS2322: nope".to_string()
            }
        );
        assert!(out.contains("Compiled with the following type errors"));
    }

    #[test]
    fn ci_promotes_warnings() {
        let project = TestProject::new().expect("project");
        let env = Env::from_pairs([("CI", "true")]);
        let report = BundleReport {
            warnings: vec!["unused variable x".to_string()],
            ..BundleReport::default()
        };
        let (result, out, _) = run(&project, &env, BuildOptions::default(), report);

        assert!(matches!(
            result.expect_err("ci fails").downcast_ref::<TaskError>(),
            Some(TaskError::CompileError(msg)) if msg == "unused variable x"
        ));
        assert!(out.contains("Treating warnings as errors because CI = true."));
    }

    #[test]
    fn warnings_pass_outside_ci() {
        let project = TestProject::new().expect("project");
        let report = BundleReport {
            warnings: vec!["unused variable x".to_string()],
            ..BundleReport::default()
        };
        let (result, out, _) = run(&project, &Env::default(), BuildOptions::default(), report);
        result.expect("build");
        assert!(out.contains("Compiled with warnings."));
        assert!(out.contains("unused variable x"));
    }

    #[test]
    fn missing_entry_skips_bundler() {
        let project = TestProject::empty().expect("project");
        project.write("public/index.html", "<html></html>").expect("write");
        let (result, out, bundler) = run(
            &project,
            &Env::default(),
            BuildOptions::default(),
            BundleReport::default(),
        );

        let err = result.expect_err("missing js entry");
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::MissingRequiredFiles(files)) if files == &vec![project.path("src/index.js")]
        ));
        assert_eq!(bundler.calls(), 0);
        assert!(out.is_empty());
        assert!(!project.path("build").exists());
    }

    #[test]
    fn public_assets_are_copied_and_old_output_cleared() {
        let project = TestProject::new().expect("project");
        project.write("public/robots.txt", "User-agent: *\n").expect("write");
        project.write("build/stale.txt", "old").expect("write");
        project.write("build/static/js/main.aaaa1111.js", "x".repeat(4000).as_str()).expect("write");
        let (result, out, _) = run(
            &project,
            &Env::default(),
            BuildOptions::default(),
            BundleReport::default(),
        );
        result.expect("build");

        assert!(project.path("build/robots.txt").is_file());
        assert!(!project.path("build/index.html").exists());
        assert!(!project.path("build/stale.txt").exists());
        assert!(!project.path("build/static/js/main.aaaa1111.js").exists());
        assert!(!out.contains("File sizes after gzip"));
    }

    #[test]
    fn size_report_marks_fast_growing_assets() {
        let project = TestProject::new().expect("project");
        let paths = ProjectPaths::new(project.root(), &PathSettings::default());
        let mut previous = sizes::SizeMap::new();
        previous.insert("static/js/main.js".to_string(), 1000);
        previous.insert("static/css/main.css".to_string(), 1000);
        let assets = sizes::report(
            &[
                ("static/js/main.aaaa.js".to_string(), 1000 + sizes::LARGE_GROWTH + 1),
                ("static/css/main.bbbb.css".to_string(), 1200),
            ],
            &previous,
        );
        let mut out = Vec::new();
        print_file_sizes(&mut out, &assets, &paths, Path::new("build")).expect("print");
        let out = String::from_utf8(out).expect("utf8");

        let js = out.lines().find(|l| l.contains("main.aaaa.js")).expect("js row");
        assert!(js.ends_with("build/static/js/main.aaaa.js  (grew significantly)"));
        let css = out.lines().find(|l| l.contains("main.bbbb.css")).expect("css row");
        assert!(css.ends_with("build/static/css/main.bbbb.css"));
        assert!(!out.contains("significantly larger than recommended"));
    }
}
