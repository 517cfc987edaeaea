//! Deterministic, pure logic shared by the task modes.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod config;
pub mod error;
pub mod messages;
pub mod sizes;
pub mod state;
pub mod watch;
