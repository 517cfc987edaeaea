//! Process exit codes for devtask commands.

/// Task finished cleanly, or a long-running task was asked to stop.
pub const OK: i32 = 0;
/// Validation, port negotiation, compilation or service start-up failed.
pub const FAILURE: i32 = 1;
