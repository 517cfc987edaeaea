//! Normalization of bundler diagnostics and the build pass/fail decision.

use std::sync::LazyLock;

use regex::Regex;

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());
static LOADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Module [A-Za-z ]+\(from ").unwrap());
static STACK_FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*at\s.*:\d+:\d+[\s)]*$").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Warnings CI never promotes to errors.
const BENIGN_WARNING: &str = "Failed to parse source map";
const SYNTAX_ERROR_LABEL: &str = "Syntax error:";

/// Cleaned-up diagnostics from a single compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileMessages {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Outcome of a compile once policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success {
        warnings: Vec<String>,
    },
    Failed {
        /// Single consolidated message shown to the operator.
        message: String,
        /// Failure came from CI promoting warnings rather than from errors.
        warnings_as_errors: bool,
    },
}

/// Strip terminal escapes, loader boilerplate and stack frames from one message.
pub fn format_message(raw: &str) -> String {
    let plain = ANSI_RE.replace_all(raw, "");
    let lines: Vec<String> = plain
        .lines()
        .filter(|line| !LOADER_LINE_RE.is_match(line))
        .filter(|line| !STACK_FRAME_RE.is_match(line))
        .map(|line| {
            line.replacen("Module build failed: SyntaxError:", SYNTAX_ERROR_LABEL, 1)
                .replacen("SyntaxError:", SYNTAX_ERROR_LABEL, 1)
                .trim_end()
                .to_string()
        })
        .collect();
    let joined = lines.join("\n");
    BLANK_RUN_RE.replace_all(&joined, "\n\n").trim().to_string()
}

/// Format raw diagnostics, dropping empties and duplicates.
///
/// When any error looks like a syntax error only those are kept; the rest
/// are usually consequences of it.
pub fn format_messages(errors: &[String], warnings: &[String]) -> CompileMessages {
    let mut errors = clean(errors);
    if errors.iter().any(|e| e.contains(SYNTAX_ERROR_LABEL)) {
        errors.retain(|e| e.contains(SYNTAX_ERROR_LABEL));
    }
    CompileMessages {
        errors,
        warnings: clean(warnings),
    }
}

fn clean(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for message in raw.iter().map(|m| format_message(m)) {
        if !message.is_empty() && !out.contains(&message) {
            out.push(message);
        }
    }
    out
}

/// Decide whether a compile passed.
///
/// Only the first error is surfaced. In CI mode warnings fail the build,
/// except for unparseable source maps.
pub fn evaluate(messages: CompileMessages, ci_mode: bool) -> Verdict {
    if let Some(first) = messages.errors.into_iter().next() {
        return Verdict::Failed {
            message: first,
            warnings_as_errors: false,
        };
    }

    if ci_mode {
        let promoted: Vec<&String> = messages
            .warnings
            .iter()
            .filter(|w| !w.contains(BENIGN_WARNING))
            .collect();
        if !promoted.is_empty() {
            return Verdict::Failed {
                message: promoted
                    .iter()
                    .map(|w| w.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                warnings_as_errors: true,
            };
        }
    }

    Verdict::Success {
        warnings: messages.warnings,
    }
}
