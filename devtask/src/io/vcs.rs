//! Version-control detection for choosing the test watch strategy.
//!
//! Detection is the logical OR of independent probes. A probe that cannot
//! run (tool missing, not a repository, spawn error) answers `false`; its
//! failure is logged and never propagated.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

/// One way of asking "is this directory tracked?".
pub trait VcsProbe {
    fn name(&self) -> &'static str;
    /// `Ok(true)` if `dir` is inside a working tree of this system.
    fn check(&self, dir: &Path) -> Result<bool>;
}

/// `git rev-parse --is-inside-work-tree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitProbe;

impl VcsProbe for GitProbe {
    fn name(&self) -> &'static str {
        "git"
    }

    fn check(&self, dir: &Path) -> Result<bool> {
        run_quiet("git", &["rev-parse", "--is-inside-work-tree"], dir)
    }
}

/// `hg --cwd <dir> root`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MercurialProbe;

impl VcsProbe for MercurialProbe {
    fn name(&self) -> &'static str {
        "hg"
    }

    fn check(&self, dir: &Path) -> Result<bool> {
        let cwd = dir.to_string_lossy();
        run_quiet("hg", &["--cwd", cwd.as_ref(), "root"], dir)
    }
}

/// True if `dir` is tracked by git or Mercurial.
pub fn is_under_version_control(dir: &Path) -> bool {
    detect(dir, &[&GitProbe, &MercurialProbe])
}

/// OR over `probes`, treating probe errors as `false`.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn detect(dir: &Path, probes: &[&dyn VcsProbe]) -> bool {
    probes.iter().any(|probe| match probe.check(dir) {
        Ok(found) => {
            debug!(probe = probe.name(), found, "vcs probe");
            found
        }
        Err(err) => {
            debug!(probe = probe.name(), err = %format!("{err:#}"), "vcs probe unavailable");
            false
        }
    })
}

fn run_quiet(program: &str, args: &[&str], dir: &Path) -> Result<bool> {
    let status = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("spawn {program} {}", args.join(" ")))?;
    Ok(status.success())
}
