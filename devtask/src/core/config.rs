//! Immutable per-invocation task configuration.
//!
//! The process environment is captured once into an [`Env`] snapshot at
//! startup. [`TaskConfig`] is derived from that snapshot and threaded through
//! every component by reference; nothing below `main` reads `std::env`.

use std::collections::BTreeMap;

/// Port used when `PORT` is unset or unusable.
pub const DEFAULT_PORT: u16 = 3000;
/// Host used when `HOST` is unset.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The three task modes exposed by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One-shot production build.
    Build,
    /// Long-running development server.
    Serve,
    /// Test runner, optionally in watch mode.
    Test,
}

impl Mode {
    /// Value handed to delegated tools as `NODE_ENV` / `BABEL_ENV`.
    pub fn node_env(self) -> &'static str {
        match self {
            Mode::Build => "production",
            Mode::Serve => "development",
            Mode::Test => "test",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Build => "build",
            Mode::Serve => "start",
            Mode::Test => "test",
        }
    }
}

/// Snapshot of environment variables taken once at process start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// True only for the literal value `true`.
    fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }
}

/// Whether a `CI` value marks the run as automated.
///
/// Any non-empty value other than a case-insensitive `false` counts.
pub fn is_ci_value(value: Option<&str>) -> bool {
    match value {
        Some(v) => !v.is_empty() && !v.eq_ignore_ascii_case("false"),
        None => false,
    }
}

/// Configuration for a single task invocation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub mode: Mode,
    /// Preferred listening port (Serve only).
    pub preferred_port: u16,
    pub host: String,
    /// `HOST` was set explicitly rather than defaulted.
    pub host_from_env: bool,
    /// Report URLs with `https`.
    pub https: bool,
    /// Test runner stays resident (Test only).
    pub watch: bool,
    pub ci_mode: bool,
    /// A failed compile still exits 0 after reporting (`TSC_COMPILE_ON_ERROR`).
    pub compile_on_error: bool,
}

impl TaskConfig {
    pub fn new(mode: Mode, env: &Env) -> Self {
        let host_var = env.get("HOST").filter(|h| !h.trim().is_empty());
        Self {
            mode,
            preferred_port: parse_port(env.get("PORT")),
            host: host_var.unwrap_or(DEFAULT_HOST).to_string(),
            host_from_env: host_var.is_some(),
            https: env.flag("HTTPS"),
            watch: false,
            ci_mode: is_ci_value(env.get("CI")),
            compile_on_error: env.flag("TSC_COMPILE_ON_ERROR"),
        }
    }

    pub fn protocol(&self) -> &'static str {
        if self.https { "https" } else { "http" }
    }
}

/// Parse `PORT`, falling back to [`DEFAULT_PORT`] for missing, malformed or zero values.
fn parse_port(value: Option<&str>) -> u16 {
    value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = TaskConfig::new(Mode::Serve, &Env::default());
        assert_eq!(cfg.preferred_port, DEFAULT_PORT);
        assert_eq!(cfg.host, DEFAULT_HOST);
        assert!(!cfg.host_from_env);
        assert!(!cfg.ci_mode);
        assert!(!cfg.https);
        assert_eq!(cfg.protocol(), "http");
    }

    #[test]
    fn reads_port_host_and_flags() {
        let env = Env::from_pairs([
            ("PORT", "8080"),
            ("HOST", "0.0.0.0"),
            ("HTTPS", "true"),
            ("CI", "1"),
            ("TSC_COMPILE_ON_ERROR", "true"),
        ]);
        let cfg = TaskConfig::new(Mode::Build, &env);
        assert_eq!(cfg.preferred_port, 8080);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(cfg.host_from_env);
        assert!(cfg.https);
        assert!(cfg.ci_mode);
        assert!(cfg.compile_on_error);
    }

    #[test]
    fn malformed_port_falls_back_to_default() {
        for raw in ["abc", "", "0", "70000"] {
            let env = Env::from_pairs([("PORT", raw)]);
            assert_eq!(TaskConfig::new(Mode::Serve, &env).preferred_port, DEFAULT_PORT);
        }
    }

    #[test]
    fn ci_false_is_not_ci() {
        assert!(!is_ci_value(Some("false")));
        assert!(!is_ci_value(Some("FALSE")));
        assert!(!is_ci_value(Some("")));
        assert!(!is_ci_value(None));
        assert!(is_ci_value(Some("true")));
        assert!(is_ci_value(Some("1")));
    }

    #[test]
    fn https_requires_literal_true() {
        let env = Env::from_pairs([("HTTPS", "1")]);
        assert!(!TaskConfig::new(Mode::Serve, &env).https);
    }
}
