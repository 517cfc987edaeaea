//! Bundler abstraction for production builds.
//!
//! The [`Bundler`] trait decouples the build task from the actual bundler
//! backend (an external command printing a JSON stats document). Tests use
//! scripted bundlers that return predetermined reports without spawning
//! processes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, command_from_argv, run_command_with_timeout};

/// Parameters for one bundler run.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Working directory for the bundler process.
    pub workdir: PathBuf,
    /// Argv-style bundler invocation.
    pub command: Vec<String>,
    /// `NODE_ENV` / `BABEL_ENV` value.
    pub node_env: &'static str,
    /// Maximum time to wait for the bundler.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Raw diagnostics and stats from one compile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Machine-readable stats, when the bundler produced any.
    pub stats: Option<Value>,
}

/// Abstraction over bundler backends.
pub trait Bundler {
    /// Compile once. Compile failures are reported in `errors`; `Err` means
    /// the bundler could not be run at all.
    fn bundle(&self, request: &BundleRequest) -> Result<BundleReport>;
}

/// Bundler that runs an external command.
pub struct CommandBundler;

impl Bundler for CommandBundler {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn bundle(&self, request: &BundleRequest) -> Result<BundleReport> {
        info!(workdir = %request.workdir.display(), "starting bundler");
        let mut cmd = command_from_argv(&request.command, &request.workdir)?;
        cmd.env("NODE_ENV", request.node_env)
            .env("BABEL_ENV", request.node_env);

        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)?;
        if output.timed_out {
            warn!("bundler timed out");
            return Ok(BundleReport {
                errors: vec![format!(
                    "bundler did not finish within {}s",
                    request.timeout.as_secs()
                )],
                ..BundleReport::default()
            });
        }
        Ok(report_from_output(&output))
    }
}

/// Interpret bundler output.
///
/// A JSON stats document on stdout is authoritative. Without one, a failing
/// exit status turns stderr (or the status itself) into a single error.
pub fn report_from_output(output: &CommandOutput) -> BundleReport {
    if let Some(stats) = parse_stats(&output.stdout) {
        let mut report = BundleReport {
            errors: collect_messages(&stats, "errors"),
            warnings: collect_messages(&stats, "warnings"),
            stats: Some(stats),
        };
        if report.errors.is_empty() && !output.status.success() {
            report.errors.push(failure_text(output));
        }
        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "parsed bundler stats"
        );
        return report;
    }

    if output.status.success() {
        debug!("bundler succeeded without stats output");
        return BundleReport::default();
    }
    BundleReport {
        errors: vec![failure_text(output)],
        ..BundleReport::default()
    }
}

fn failure_text(output: &CommandOutput) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        match output.status.code() {
            Some(code) => format!("bundler exited with code {code}"),
            None => "bundler was terminated by a signal".to_string(),
        }
    } else {
        stderr.to_string()
    }
}

/// Parse stdout as a stats object, tolerating leading log noise before the JSON.
fn parse_stats(stdout: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(stdout);
    let start = text.find('{')?;
    match serde_json::from_str::<Value>(text[start..].trim_end()) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Messages under `key`; entries are strings or objects with a `message` field.
fn collect_messages(stats: &Value, key: &str) -> Vec<String> {
    let Some(items) = stats.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => {
                let message = obj.get("message").and_then(Value::as_str)?;
                match obj.get("moduleName").and_then(Value::as_str) {
                    Some(module) => Some(format!("{module}\n{message}")),
                    None => Some(message.to_string()),
                }
            }
            _ => None,
        })
        .collect()
}
