//! Helpers for running delegated tools as child processes.
//!
//! One-shot tools (the production bundler) run to completion with a timeout
//! and bounded captured output. Long-running tools (watch compiler, test
//! runner) are spawned on the tokio runtime and stopped explicitly.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::process::Child;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Result of a one-shot tool run.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes read from stdout past the capture limit and discarded.
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// The child outlived its deadline and was killed.
    pub timed_out: bool,
}

/// One output stream: the kept prefix and how much was dropped after it.
#[derive(Debug, Default)]
struct Captured {
    kept: Vec<u8>,
    dropped: usize,
}

type Reader = thread::JoinHandle<io::Result<Captured>>;

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// Both pipes are drained on their own threads for the whole run, so a chatty
/// child never blocks on a full pipe. At most `output_limit_bytes` of each
/// stream are kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .inspect_err(|err| error!(%program, %err, "spawn failed"))
        .with_context(|| format!("spawn {program}"))?;
    debug!(%program, pid = child.id(), "child spawned");

    let stdout = capture(child.stdout.take(), output_limit_bytes)?;
    let stderr = capture(child.stderr.take(), output_limit_bytes)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(%program, timeout_secs = timeout.as_secs(), "deadline passed, killing");
            child.kill().context("kill command")?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    let stdout = finish(stdout, "stdout")?;
    let stderr = finish(stderr, "stderr")?;
    if stdout.dropped + stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "captured output hit its limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "command finished");

    Ok(CommandOutput {
        status,
        stdout: stdout.kept,
        stderr: stderr.kept,
        stdout_truncated: stdout.dropped,
        stderr_truncated: stderr.dropped,
        timed_out,
    })
}

fn capture<R>(pipe: Option<R>, limit: usize) -> Result<Reader>
where
    R: Read + Send + 'static,
{
    let pipe = pipe.ok_or_else(|| anyhow!("child output is not piped"))?;
    Ok(thread::spawn(move || keep_prefix(pipe, limit)))
}

/// Keep the first `limit` bytes and count the rest while reading to EOF.
fn keep_prefix(mut pipe: impl Read, limit: usize) -> io::Result<Captured> {
    let mut kept = Vec::new();
    pipe.by_ref().take(limit as u64).read_to_end(&mut kept)?;
    let dropped = io::copy(&mut pipe, &mut io::sink())?;
    Ok(Captured {
        kept,
        dropped: usize::try_from(dropped).unwrap_or(usize::MAX),
    })
}

fn finish(reader: Reader, stream: &str) -> Result<Captured> {
    reader
        .join()
        .map_err(|_| anyhow!("{stream} reader panicked"))?
        .with_context(|| format!("read {stream}"))
}

/// Build a `std` command from an argv-style list, rooted in `workdir`.
pub fn command_from_argv(argv: &[String], workdir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workdir);
    Ok(cmd)
}

/// Spawn a long-running tool that shares the terminal's stdout/stderr.
///
/// `inherit_stdin` hands the terminal to the child (interactive watchers);
/// otherwise stdin is closed so the parent can observe end-of-input itself.
/// The child is killed if its handle is dropped without being stopped.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or("")))]
pub fn spawn_service(
    argv: &[String],
    workdir: &Path,
    envs: &[(&str, &str)],
    inherit_stdin: bool,
) -> Result<Child> {
    let mut cmd = tokio::process::Command::from(command_from_argv(argv, workdir)?);
    cmd.envs(envs.iter().copied())
        .stdin(if inherit_stdin {
            Stdio::inherit()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    debug!("spawning service process");
    cmd.spawn()
        .with_context(|| format!("spawn {}", argv.join(" ")))
}

/// Stop a spawned service, returning its exit code if it had already exited.
pub async fn stop_child(child: &mut Child, label: &str) -> Result<Option<i32>> {
    if let Some(status) = child.try_wait().with_context(|| format!("poll {label}"))? {
        debug!(label, exit_code = ?status.code(), "service already exited");
        return Ok(status.code());
    }
    debug!(label, "killing service process");
    child
        .start_kill()
        .with_context(|| format!("kill {label}"))?;
    child
        .wait()
        .await
        .with_context(|| format!("wait for {label} after kill"))?;
    Ok(None)
}
