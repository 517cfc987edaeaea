//! Operator confirmation prompts.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

/// Asks the operator a yes/no question.
pub trait Prompter {
    fn confirm(&self, question: &str, default_yes: bool) -> Result<bool>;
}

/// Prompter backed by the controlling terminal (stdout + stdin).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default_yes: bool) -> Result<bool> {
        let hint = if default_yes { "Y/n" } else { "y/N" };
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{question} ({hint}) ").context("write prompt")?;
        stdout.flush().context("flush prompt")?;
        drop(stdout);

        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read prompt answer")?;
        Ok(parse_answer(&line, default_yes))
    }
}

/// Interpret a typed answer; blank input takes the default.
///
/// End-of-input (an empty read) is a refusal regardless of the default.
pub fn parse_answer(line: &str, default_yes: bool) -> bool {
    if line.is_empty() {
        return false;
    }
    match line.trim().to_ascii_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_takes_default() {
        assert!(parse_answer("\n", true));
        assert!(!parse_answer("\n", false));
    }

    #[test]
    fn explicit_answers_win() {
        assert!(parse_answer("yes\n", false));
        assert!(parse_answer("Y\n", false));
        assert!(!parse_answer("n\n", true));
        assert!(!parse_answer("nope\n", true));
    }

    #[test]
    fn end_of_input_refuses() {
        assert!(!parse_answer("", true));
    }
}
