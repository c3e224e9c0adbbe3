//! Context builder: digests prior attempts into prompt feedback.
//!
//! The digest is deterministic given the same history, orders attempts by
//! ascending ordinal, and includes every prior attempt in full: silent
//! truncation here would hide exactly the failures the next attempt must fix.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use std::sync::LazyLock;

use crate::core::types::Attempt;

const FEEDBACK_TEMPLATE: &str = include_str!("prompts/feedback.md");

const FIRST_ATTEMPT_CONTEXT: &str = "This is the first attempt. Prioritize a correct solution \
over an optimized one: handle the stated edge cases explicitly and prefer a simple algorithm \
that passes all tests.";

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("feedback", FEEDBACK_TEMPLATE)
        .expect("feedback template should be valid");
    env
});

/// Build the prompt context for the next attempt from all prior attempts.
///
/// With no history, returns a fixed correctness-first instruction.
pub fn build_context(prior_attempts: &[Attempt], next_ordinal: u32) -> Result<String> {
    if prior_attempts.is_empty() {
        return Ok(FIRST_ATTEMPT_CONTEXT.to_string());
    }

    let mut ordered: Vec<&Attempt> = prior_attempts.iter().collect();
    ordered.sort_by_key(|attempt| attempt.number);

    let template = ENGINE
        .get_template("feedback")
        .expect("feedback template is registered");
    template
        .render(context! {
            next_ordinal => next_ordinal,
            attempts => ordered,
        })
        .context("render feedback digest")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Language, TestRecord};

    fn attempt(number: u32, score: f64) -> Attempt {
        Attempt {
            session_id: "s-1".to_string(),
            number,
            code: format!("def solve_{number}(): pass"),
            rationale: String::new(),
            language: Language::Python,
            score,
            failed_tests: vec![TestRecord {
                input: "(1, 2)".to_string(),
                expected: "3".to_string(),
                actual: "4".to_string(),
                passed: false,
                time_ms: 5,
                memory_kb: 0,
                status: "failed".to_string(),
                error: Some("off by one".to_string()),
            }],
            errors: vec!["TypeError".to_string()],
        }
    }

    #[test]
    fn empty_history_yields_neutral_instruction() {
        let text = build_context(&[], 1).expect("context");
        assert!(text.contains("first attempt"));
        assert!(text.contains("correct"));
    }

    #[test]
    fn digest_includes_every_attempt_in_order() {
        let history = vec![attempt(2, 50.0), attempt(1, 20.0)];
        let text = build_context(&history, 3).expect("context");

        let first = text.find("Attempt 1").expect("attempt 1 present");
        let second = text.find("Attempt 2").expect("attempt 2 present");
        assert!(first < second, "attempts must be ordered by ordinal");
        assert!(text.contains("solve_1"));
        assert!(text.contains("solve_2"));
    }

    #[test]
    fn digest_carries_failure_details_and_directive() {
        let history = vec![attempt(1, 20.0)];
        let text = build_context(&history, 2).expect("context");

        assert!(text.contains("(1, 2)"));
        assert!(text.contains("expected: 3"));
        assert!(text.contains("actual: 4"));
        assert!(text.contains("off by one"));
        assert!(text.contains("TypeError"));
        assert!(text.contains("Improvement strategy"));
        assert!(text.contains("complexity"));
    }

    #[test]
    fn digest_is_deterministic() {
        let history = vec![attempt(1, 20.0), attempt(2, 50.0)];
        assert_eq!(
            build_context(&history, 3).expect("context"),
            build_context(&history, 3).expect("context")
        );
    }
}
