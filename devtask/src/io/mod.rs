//! Side-effecting helpers: filesystem, child processes, sockets and the terminal.

pub mod build_output;
pub mod bundler;
pub mod paths;
pub mod port;
pub mod process;
pub mod prompt;
pub mod settings;
pub mod test_runner;
pub mod vcs;
