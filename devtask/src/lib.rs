//! Build, serve and test orchestration for browser applications.
//!
//! `devtask` wraps a bundler, a development server and a test runner behind
//! three commands. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure logic (configuration, message policy, size report,
//!   watch strategy, task state machine). No I/O.
//! - **[`io`]**: Side effects (files, processes, sockets, prompts).
//!
//! The task modules ([`build`], [`start`], [`test_mode`]) wire the two
//! together, and [`lifecycle`] supervises long-running delegated services.

pub mod build;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod start;
pub mod test_mode;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
