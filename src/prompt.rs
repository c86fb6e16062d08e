//! Decision boundary consulted when a removal would break lineage references.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// Answer to "removing `label` breaks `match_count` lineage references".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    /// Forget the lineage of every affected column, then remove.
    #[serde(alias = "proceed")]
    ProceedAndClear,
    /// Keep the source connection; the removal is aborted.
    #[serde(alias = "keep")]
    KeepAndAbort,
    #[serde(alias = "cancel")]
    CancelAndAbort,
}

impl Decision {
    pub fn aborts(self) -> bool {
        !matches!(self, Decision::ProceedAndClear)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::ProceedAndClear => "proceed-and-clear",
            Decision::KeepAndAbort => "keep-and-abort",
            Decision::CancelAndAbort => "cancel-and-abort",
        };
        f.write_str(s)
    }
}

/// Synchronous query answered by the presentation layer.
///
/// Implementations must not touch the model.
pub trait DecisionPrompter {
    fn decide(&mut self, match_count: usize, label: &str) -> Decision;
}

impl DecisionPrompter for Box<dyn DecisionPrompter> {
    fn decide(&mut self, match_count: usize, label: &str) -> Decision {
        (**self).decide(match_count, label)
    }
}

/// Always answers with the same decision. Used where nobody can be asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDecision(pub Decision);

impl DecisionPrompter for FixedDecision {
    fn decide(&mut self, match_count: usize, label: &str) -> Decision {
        debug!(
            "answering {} for '{}' ({} reference(s)) without asking",
            self.0, label, match_count
        );
        self.0
    }
}

/// One recorded question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptCall {
    pub match_count: usize,
    pub label: String,
}

/// Replays queued decisions, then answers with the fallback.
/// Every question is recorded.
#[derive(Debug, Clone)]
pub struct ScriptedPrompter {
    script: VecDeque<Decision>,
    fallback: Decision,
    calls: Vec<PromptCall>,
}

impl ScriptedPrompter {
    pub fn new(script: impl IntoIterator<Item = Decision>, fallback: Decision) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback,
            calls: Vec::new(),
        }
    }

    pub fn always(decision: Decision) -> Self {
        Self::new([], decision)
    }

    pub fn calls(&self) -> &[PromptCall] {
        &self.calls
    }
}

impl DecisionPrompter for ScriptedPrompter {
    fn decide(&mut self, match_count: usize, label: &str) -> Decision {
        self.calls.push(PromptCall {
            match_count,
            label: label.to_string(),
        });
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn given_script_when_exhausted_then_falls_back() {
        let mut prompter = ScriptedPrompter::new(
            [Decision::ProceedAndClear, Decision::KeepAndAbort],
            Decision::CancelAndAbort,
        );
        assert_eq!(prompter.decide(1, "a"), Decision::ProceedAndClear);
        assert_eq!(prompter.decide(2, "b"), Decision::KeepAndAbort);
        assert_eq!(prompter.decide(3, "c"), Decision::CancelAndAbort);
        assert_eq!(prompter.calls().len(), 3);
        assert_eq!(
            prompter.calls()[1],
            PromptCall {
                match_count: 2,
                label: "b".into()
            }
        );
    }

    #[rstest]
    #[case("\"proceed-and-clear\"", Decision::ProceedAndClear)]
    #[case("\"proceed\"", Decision::ProceedAndClear)]
    #[case("\"keep\"", Decision::KeepAndAbort)]
    #[case("\"cancel-and-abort\"", Decision::CancelAndAbort)]
    fn given_decision_text_when_parsing_then_accepts_aliases(
        #[case] text: &str,
        #[case] expected: Decision,
    ) {
        #[derive(Deserialize)]
        struct Wrapper {
            decision: Decision,
        }
        let parsed: Wrapper = toml::from_str(&format!("decision = {}", text)).unwrap();
        assert_eq!(parsed.decision, expected);
    }

    #[test]
    fn given_boxed_prompter_when_deciding_then_delegates() {
        let mut boxed: Box<dyn DecisionPrompter> =
            Box::new(FixedDecision(Decision::KeepAndAbort));
        assert_eq!(boxed.decide(4, "db"), Decision::KeepAndAbort);
        assert!(Decision::KeepAndAbort.aborts());
        assert!(!Decision::ProceedAndClear.aborts());
    }
}
