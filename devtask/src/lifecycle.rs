//! Supervision of long-running delegated services.
//!
//! The [`Coordinator`] starts a service, waits for the first shutdown
//! trigger (signal, end-of-input, or the service ending on its own), stops
//! the service exactly once and reports the exit code. Triggers arrive over
//! a channel so tests can drive the coordinator without real signals.

use std::future::Future;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::config::TaskConfig;
use crate::core::error::TaskError;
use crate::core::state::{TaskMachine, TaskState};
use crate::exit_codes;

/// Events that ask a running task to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// stdin reached end-of-input.
    EndOfInput,
}

/// Why the supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Trigger(ShutdownTrigger),
    /// The service finished by itself with this exit code.
    ServiceExited(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub reason: ShutdownReason,
    pub exit_code: i32,
}

/// One-way "shutting down" flag shared by the coordinator and trigger sources.
#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch(Arc<AtomicBool>);

impl ShutdownLatch {
    /// Set the latch. Returns `true` only for the caller that flipped it.
    pub fn try_begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A started delegated service.
pub trait ServiceHandle: Send {
    /// Resolves when the service ends without being asked to, with its exit code.
    ///
    /// Must be cancel-safe: the coordinator may drop the future and poll a
    /// fresh one later.
    fn exited(&mut self) -> impl Future<Output = Result<i32>> + Send;
}

pub struct Coordinator {
    latch: ShutdownLatch,
    triggers: mpsc::Receiver<ShutdownTrigger>,
}

impl Coordinator {
    /// Coordinator fed by an arbitrary trigger channel.
    pub fn new(triggers: mpsc::Receiver<ShutdownTrigger>) -> Self {
        Self {
            latch: ShutdownLatch::default(),
            triggers,
        }
    }

    /// Coordinator fed by SIGINT/SIGTERM and, if `listen_for_eof`, stdin end-of-input.
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(listen_for_eof: bool) -> Result<Self> {
        let (tx, rx) = mpsc::channel(8);
        let coordinator = Self::new(rx);
        spawn_signal_listener(tx.clone(), coordinator.latch())?;
        if listen_for_eof {
            spawn_stdin_listener(tx, coordinator.latch());
        }
        Ok(coordinator)
    }

    pub fn latch(&self) -> ShutdownLatch {
        self.latch.clone()
    }

    /// Start the service, supervise it, and stop it exactly once.
    ///
    /// `machine` must be in `Starting`; it ends in `Terminated`.
    pub async fn run<'c, H, S, SF, T, TF>(
        mut self,
        config: &'c TaskConfig,
        machine: &mut TaskMachine,
        start: S,
        stop: T,
    ) -> Result<RunOutcome>
    where
        H: ServiceHandle,
        S: FnOnce(&'c TaskConfig) -> SF,
        SF: Future<Output = Result<H, TaskError>>,
        T: FnOnce(H) -> TF,
        TF: Future<Output = Result<()>>,
    {
        let mut handle = match start(config).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(mode = config.mode.label(), err = %err, "service failed to start");
                machine.terminate();
                return Err(err.into());
            }
        };
        machine.advance(TaskState::Running)?;
        info!(mode = config.mode.label(), "service running");

        let reason = tokio::select! {
            exit = handle.exited() => match exit {
                Ok(code) => ShutdownReason::ServiceExited(code),
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "lost track of service");
                    ShutdownReason::ServiceExited(exit_codes::FAILURE)
                }
            },
            Some(trigger) = self.triggers.recv() => ShutdownReason::Trigger(trigger),
        };

        if !self.latch.try_begin() {
            machine.terminate();
            bail!("shutdown already in progress");
        }
        machine.advance(TaskState::ShuttingDown)?;
        info!(?reason, "shutting down");

        let stop_fut = stop(handle);
        tokio::pin!(stop_fut);
        let stopped = loop {
            tokio::select! {
                res = &mut stop_fut => break res,
                Some(extra) = self.triggers.recv() => {
                    debug!(trigger = ?extra, "shutdown already in progress, ignoring");
                }
            }
        };
        machine.advance(TaskState::Terminated)?;
        stopped.context("stop service")?;

        let exit_code = match reason {
            ShutdownReason::Trigger(_) => exit_codes::OK,
            ShutdownReason::ServiceExited(code) => code,
        };
        debug!(exit_code, "service stopped");
        Ok(RunOutcome { reason, exit_code })
    }
}

#[cfg(unix)]
fn spawn_signal_listener(tx: mpsc::Sender<ShutdownTrigger>, latch: ShutdownLatch) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    tokio::spawn(async move {
        loop {
            let trigger = tokio::select! {
                Some(()) = interrupt.recv() => ShutdownTrigger::Interrupt,
                Some(()) = terminate.recv() => ShutdownTrigger::Terminate,
                else => break,
            };
            debug!(?trigger, shutting_down = latch.is_set(), "signal received");
            if tx.send(trigger).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_listener(tx: mpsc::Sender<ShutdownTrigger>, latch: ShutdownLatch) -> Result<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!(shutting_down = latch.is_set(), "ctrl-c received");
            if tx.send(ShutdownTrigger::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

/// Watch stdin on a plain thread; a blocking read must not hold up runtime shutdown.
fn spawn_stdin_listener(tx: mpsc::Sender<ShutdownTrigger>, latch: ShutdownLatch) {
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buffer = [0u8; 1024];
        loop {
            match stdin.read(&mut buffer) {
                Ok(0) => {
                    debug!(shutting_down = latch.is_set(), "stdin closed");
                    let _ = tx.blocking_send(ShutdownTrigger::EndOfInput);
                    break;
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(err = %err, "stdin unreadable, not watching for end-of-input");
                    break;
                }
            }
        }
    });
}
