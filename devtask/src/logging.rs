//! Diagnostic tracing for devtask itself.
//!
//! Operator-facing output (build results, URLs, prompts) goes to stdout and
//! is not affected by this module. Tracing is opt-in via `RUST_LOG` and
//! always goes to stderr so it never mixes with delegated tool output on
//! stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=devtask=debug,devtask_server=debug devtask start
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
