//! Task lifecycle state machine.
//!
//! ```text
//! Idle -> Validating -> [Negotiating] -> Starting -> Running -> ShuttingDown -> Terminated
//! ```
//!
//! `Negotiating` is entered only in Serve mode. Any non-terminal state may
//! fail straight to `Terminated`.

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::config::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Validating,
    Negotiating,
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// Tracks the current state of one task run and rejects illegal transitions.
#[derive(Debug)]
pub struct TaskMachine {
    mode: Mode,
    state: TaskState,
}

impl TaskMachine {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: TaskState::Idle,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TaskState::Terminated
    }

    /// Move to `next`, erroring if the transition is not allowed for this mode.
    pub fn advance(&mut self, next: TaskState) -> Result<()> {
        if !self.allows(next) {
            bail!(
                "illegal {} task transition {:?} -> {:?}",
                self.mode.label(),
                self.state,
                next
            );
        }
        debug!(mode = self.mode.label(), from = ?self.state, to = ?next, "task transition");
        self.state = next;
        Ok(())
    }

    /// Fail to `Terminated` from wherever we are. No-op if already terminated.
    pub fn terminate(&mut self) {
        if self.state != TaskState::Terminated {
            debug!(mode = self.mode.label(), from = ?self.state, "task terminated");
            self.state = TaskState::Terminated;
        }
    }

    fn allows(&self, next: TaskState) -> bool {
        use TaskState::{
            Idle, Negotiating, Running, ShuttingDown, Starting, Terminated, Validating,
        };
        match (self.state, next) {
            (Idle, Validating) => true,
            (Validating, Negotiating) => self.mode == Mode::Serve,
            (Validating, Starting) => self.mode != Mode::Serve,
            (Negotiating, Starting) => true,
            (Starting, Running) => true,
            (Running, ShuttingDown) => true,
            (from, Terminated) => from != Terminated,
            _ => false,
        }
    }
}
