//! Terminal implementation of the lineage decision prompt

use std::io::{self, BufRead, IsTerminal, Write};

use colored::Colorize;
use tracing::warn;

use crate::prompt::{Decision, DecisionPrompter};

/// Asks on stderr/stdin. Without a terminal, or when input ends, the
/// configured default answers.
#[derive(Debug, Clone)]
pub struct TerminalPrompter {
    default: Decision,
}

impl TerminalPrompter {
    pub fn new(default: Decision) -> Self {
        Self { default }
    }

    fn ask(&self, input: &mut impl BufRead, match_count: usize, label: &str) -> Decision {
        loop {
            eprintln!(
                "{}",
                format!(
                    "Removing '{}' breaks the ETL lineage of {} target column(s).",
                    label, match_count
                )
                .yellow()
            );
            eprint!(
                "{} ",
                format!(
                    "[f]orget lineage and remove, [k]eep source connection, [c]ancel \
                     (default: {}):",
                    self.default
                )
                .cyan()
            );
            io::stderr().flush().ok();

            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) => return self.default,
                Ok(_) => {}
                Err(e) => {
                    warn!("reading answer failed: {}", e);
                    return self.default;
                }
            }
            match parse_answer(&line) {
                Some(Answer::Default) => return self.default,
                Some(Answer::Decision(decision)) => return decision,
                None => eprintln!("{}", "Please answer f, k or c.".red()),
            }
        }
    }
}

enum Answer {
    Default,
    Decision(Decision),
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_lowercase().as_str() {
        "" => Some(Answer::Default),
        "f" | "forget" | "proceed" => Some(Answer::Decision(Decision::ProceedAndClear)),
        "k" | "keep" => Some(Answer::Decision(Decision::KeepAndAbort)),
        "c" | "cancel" => Some(Answer::Decision(Decision::CancelAndAbort)),
        _ => None,
    }
}

impl DecisionPrompter for TerminalPrompter {
    fn decide(&mut self, match_count: usize, label: &str) -> Decision {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            warn!("stdin is not a terminal, using {}", self.default);
            return self.default;
        }
        let mut input = stdin.lock();
        self.ask(&mut input, match_count, label)
    }
}
