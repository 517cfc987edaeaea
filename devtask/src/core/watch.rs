//! Test-runner watch strategy selection.

const WATCH_ALL: &str = "--watchAll";
const WATCH_ALL_OFF: &str = "--watchAll=false";
const WATCH_CHANGED: &str = "--watch";

/// How the test runner should behave after its first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStrategy {
    /// The operator passed `--watchAll` or `--watchAll=false`; args are left alone.
    Explicit { watch_all: bool },
    /// CI run: one pass, no interactive watcher.
    SinglePass,
    /// Re-run tests related to files changed since the last commit.
    ChangedFiles,
    /// Re-run everything on any change.
    All,
}

impl WatchStrategy {
    /// Flag appended to the runner's arguments, if any.
    pub fn extra_arg(self) -> Option<&'static str> {
        match self {
            WatchStrategy::ChangedFiles => Some(WATCH_CHANGED),
            WatchStrategy::All => Some(WATCH_ALL),
            WatchStrategy::Explicit { .. } | WatchStrategy::SinglePass => None,
        }
    }

    /// Whether the runner stays resident.
    pub fn is_watching(self) -> bool {
        match self {
            WatchStrategy::Explicit { watch_all } => watch_all,
            WatchStrategy::SinglePass => false,
            WatchStrategy::ChangedFiles | WatchStrategy::All => true,
        }
    }
}

/// Pick a strategy from pass-through args, CI mode and (lazily) VCS presence.
///
/// `under_version_control` is only consulted when neither an explicit flag
/// nor CI mode decides the outcome. `ci_mode` follows
/// [`is_ci_value`](crate::core::config::is_ci_value), so `CI=false` keeps
/// watch mode on.
pub fn choose_strategy(
    args: &[String],
    ci_mode: bool,
    under_version_control: impl FnOnce() -> bool,
) -> WatchStrategy {
    if args.iter().any(|a| a == WATCH_ALL_OFF) {
        return WatchStrategy::Explicit { watch_all: false };
    }
    if args.iter().any(|a| a == WATCH_ALL) {
        return WatchStrategy::Explicit { watch_all: true };
    }
    if ci_mode {
        return WatchStrategy::SinglePass;
    }
    if under_version_control() {
        WatchStrategy::ChangedFiles
    } else {
        WatchStrategy::All
    }
}

/// Final argument list handed to the test runner.
pub fn runner_args(args: &[String], strategy: WatchStrategy) -> Vec<String> {
    let mut out = args.to_vec();
    if let Some(extra) = strategy.extra_arg() {
        out.push(extra.to_string());
    }
    out
}
