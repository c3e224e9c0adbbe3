//! Pure session state transitions.
//!
//! The orchestrator owns when attempts happen; this module owns what an
//! attempt outcome does to the session record. Keeping the transition rules
//! here makes the state machine testable without any I/O.

use chrono::{DateTime, Utc};

use crate::core::classifier::classify;
use crate::core::types::{ImprovementEntry, Session, SessionStatus};

/// Result of applying one attempt outcome to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptApplied {
    /// Ordinal assigned to the applied attempt.
    pub ordinal: u32,
    /// Present only when the score strictly improved on the running best.
    pub improvement: Option<ImprovementEntry>,
    /// Whether the session reached a terminal state with this attempt.
    pub terminal: bool,
}

/// Why an attempt outcome could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The session is already `Solved` or `MaxAttemptsReached`.
    TerminalSession(SessionStatus),
    /// All attempt slots are already consumed.
    BudgetExhausted { budget: u32 },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::TerminalSession(status) => {
                write!(f, "session is terminal ({status:?}), no attempt may be applied")
            }
            StateError::BudgetExhausted { budget } => {
                write!(f, "attempt budget of {budget} already consumed")
            }
        }
    }
}

impl std::error::Error for StateError {}

/// Apply one attempt outcome (its score) to the session.
///
/// Consumes the next ordinal, updates the running best on strict improvement,
/// and drives the status machine `in_progress -> {solved, max_attempts_reached}`.
/// A failed attempt (score 0) still consumes its ordinal so the loop always
/// terminates within the budget.
pub fn apply_attempt(
    session: &mut Session,
    score: f64,
    now: DateTime<Utc>,
) -> Result<AttemptApplied, StateError> {
    if session.status.is_terminal() {
        return Err(StateError::TerminalSession(session.status));
    }
    if session.attempts_consumed >= session.attempt_budget {
        return Err(StateError::BudgetExhausted {
            budget: session.attempt_budget,
        });
    }

    let ordinal = session.attempts_consumed + 1;
    session.attempts_consumed = ordinal;

    let improvement = if score > session.best_score {
        let delta = score - session.best_score;
        session.best_score = score;
        Some(ImprovementEntry {
            from_attempt: ordinal - 1,
            to_attempt: ordinal,
            delta,
            strategy: classify(delta, score),
        })
    } else {
        None
    };

    if score >= 100.0 {
        session.status = SessionStatus::Solved;
        session.completed_at = Some(now);
    } else if session.attempts_consumed == session.attempt_budget {
        session.status = SessionStatus::MaxAttemptsReached;
        session.completed_at = Some(now);
    }

    Ok(AttemptApplied {
        ordinal,
        improvement,
        terminal: session.status.is_terminal(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Language, StrategyTag};

    fn session(budget: u32) -> Session {
        Session {
            id: "s-1".to_string(),
            problem_id: "p-1".to_string(),
            language: Language::Python,
            status: SessionStatus::InProgress,
            best_score: 0.0,
            attempts_consumed: 0,
            attempt_budget: budget,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn first_improvement_is_logged_from_ordinal_zero() {
        let mut s = session(3);
        let applied = apply_attempt(&mut s, 40.0, Utc::now()).expect("apply");

        let entry = applied.improvement.expect("improvement");
        assert_eq!(entry.from_attempt, 0);
        assert_eq!(entry.to_attempt, 1);
        assert_eq!(entry.delta, 40.0);
        assert_eq!(entry.strategy, StrategyTag::SignificantBugFix);
        assert_eq!(s.best_score, 40.0);
        assert!(!applied.terminal);
    }

    #[test]
    fn equal_score_is_not_an_improvement() {
        let mut s = session(3);
        apply_attempt(&mut s, 40.0, Utc::now()).expect("apply 1");
        let applied = apply_attempt(&mut s, 40.0, Utc::now()).expect("apply 2");

        assert!(applied.improvement.is_none());
        assert_eq!(s.best_score, 40.0);
        assert_eq!(s.attempts_consumed, 2);
    }

    #[test]
    fn perfect_score_solves_the_session() {
        let mut s = session(3);
        apply_attempt(&mut s, 40.0, Utc::now()).expect("apply 1");
        apply_attempt(&mut s, 40.0, Utc::now()).expect("apply 2");
        let applied = apply_attempt(&mut s, 100.0, Utc::now()).expect("apply 3");

        assert!(applied.terminal);
        assert_eq!(s.status, SessionStatus::Solved);
        assert!(s.completed_at.is_some());
        let entry = applied.improvement.expect("improvement");
        assert_eq!(entry.from_attempt, 2);
        assert_eq!(entry.to_attempt, 3);
        assert_eq!(entry.strategy, StrategyTag::ProblemSolved);
    }

    #[test]
    fn exhausted_budget_without_solve_is_max_attempts_reached() {
        let mut s = session(2);
        apply_attempt(&mut s, 60.0, Utc::now()).expect("apply 1");
        let applied = apply_attempt(&mut s, 60.0, Utc::now()).expect("apply 2");

        assert!(applied.terminal);
        assert_eq!(s.status, SessionStatus::MaxAttemptsReached);
        assert_eq!(s.best_score, 60.0);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn terminal_session_rejects_further_attempts() {
        let mut s = session(1);
        apply_attempt(&mut s, 100.0, Utc::now()).expect("apply");

        let err = apply_attempt(&mut s, 50.0, Utc::now()).expect_err("terminal");
        assert!(matches!(err, StateError::TerminalSession(SessionStatus::Solved)));
    }

    #[test]
    fn best_score_never_decreases() {
        let mut s = session(3);
        apply_attempt(&mut s, 70.0, Utc::now()).expect("apply 1");
        apply_attempt(&mut s, 30.0, Utc::now()).expect("apply 2");

        assert_eq!(s.best_score, 70.0);
    }
}
