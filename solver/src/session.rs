//! Session orchestration: the bounded generate -> evaluate -> improve loop.
//!
//! The orchestrator owns session-status transitions and ties the other
//! components together through injected seams ([`ProblemSource`],
//! [`Generator`], [`Evaluator`], [`Store`]), so the loop is testable against
//! fakes. Within one session the attempt pipeline is strictly sequential; a
//! shared [`SessionLocks`] registry rejects re-entrant calls against the same
//! session id. Independent sessions run concurrently with no shared mutable
//! state beyond the store.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::context::build_context;
use crate::core::extract::extract;
use crate::core::state::apply_attempt;
use crate::core::types::{
    Attempt, ImprovementEntry, Language, LatestAttempt, Problem, Session, SessionReport,
    SessionStatus, TestReport,
};
use crate::io::evaluator::Evaluator;
use crate::io::generator::Generator;
use crate::io::problems::ProblemSource;
use crate::io::store::Store;
use crate::pipeline::{self, PipelineConfig};

/// Parameters for one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub problem_id: String,
    pub language: Language,
    pub attempt_budget: u32,
    /// Resume this session instead of starting a new one. An id that does
    /// not resolve to a stored session starts a fresh session under it.
    pub session_id: Option<String>,
}

/// The problem id did not resolve. Fatal to the call; no attempt consumed.
#[derive(Debug, Clone)]
pub struct UnknownProblemError {
    pub problem_id: String,
}

impl std::fmt::Display for UnknownProblemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown problem '{}'", self.problem_id)
    }
}

impl std::error::Error for UnknownProblemError {}

/// Another call is already running an attempt for this session.
#[derive(Debug, Clone)]
pub struct SessionBusyError {
    pub session_id: String,
}

impl std::fmt::Display for SessionBusyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "session '{}' already has an attempt in flight",
            self.session_id
        )
    }
}

impl std::error::Error for SessionBusyError {}

/// Registry enforcing at most one in-flight attempt loop per session id.
#[derive(Debug, Default)]
pub struct SessionLocks {
    active: Mutex<HashSet<String>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, session_id: &str) -> Result<SessionLockGuard<'_>> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| anyhow!("session lock registry poisoned"))?;
        if !active.insert(session_id.to_string()) {
            return Err(SessionBusyError {
                session_id: session_id.to_string(),
            }
            .into());
        }
        Ok(SessionLockGuard {
            locks: self,
            session_id: session_id.to_string(),
        })
    }
}

#[derive(Debug)]
struct SessionLockGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
}

impl Drop for SessionLockGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.locks.active.lock() {
            active.remove(&self.session_id);
        }
    }
}

/// The orchestrator with its injected collaborators.
pub struct SessionRunner<'a, P, G, E, S> {
    pub problems: &'a P,
    pub generator: &'a G,
    pub evaluator: &'a E,
    pub store: &'a S,
    pub locks: &'a SessionLocks,
    pub pipeline: &'a PipelineConfig,
}

impl<P, G, E, S> SessionRunner<'_, P, G, E, S>
where
    P: ProblemSource,
    G: Generator,
    E: Evaluator,
    S: Store,
{
    /// Run a bounded improvement session for a problem.
    ///
    /// Resumes the given session when it exists, otherwise creates one. On a
    /// session already in a terminal state this is an idempotent no-op that
    /// reports the stored best attempt without generating.
    #[instrument(skip_all, fields(problem_id = %request.problem_id, language = request.language.as_str()))]
    pub fn run(&self, request: &RunRequest) -> Result<SessionReport> {
        let start = Instant::now();

        let problem = self
            .problems
            .fetch(&request.problem_id)
            .context("fetch problem")?
            .ok_or_else(|| UnknownProblemError {
                problem_id: request.problem_id.clone(),
            })?;
        if request.attempt_budget == 0 {
            return Err(anyhow!("attempt_budget must be > 0"));
        }

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| new_session_id(&request.problem_id));
        let _guard = self.locks.acquire(&session_id)?;

        let mut session = match self.store.load_session(&session_id)? {
            Some(stored) => {
                if stored.problem_id != request.problem_id {
                    return Err(anyhow!(
                        "session '{}' belongs to problem '{}', not '{}'",
                        session_id,
                        stored.problem_id,
                        request.problem_id
                    ));
                }
                info!(session_id = %session_id, attempts = stored.attempts_consumed, "resuming session");
                stored
            }
            None => {
                let session = Session {
                    id: session_id.clone(),
                    problem_id: request.problem_id.clone(),
                    language: request.language,
                    status: SessionStatus::InProgress,
                    best_score: 0.0,
                    attempts_consumed: 0,
                    attempt_budget: request.attempt_budget,
                    created_at: Utc::now(),
                    completed_at: None,
                };
                self.store
                    .create_session(&session)
                    .context("create session")?;
                info!(session_id = %session_id, budget = session.attempt_budget, "created session");
                session
            }
        };

        if session.status.is_terminal() {
            info!(session_id = %session_id, status = ?session.status, "session already terminal");
            return self.build_report(&session, start);
        }

        while !session.status.is_terminal() && session.attempts_consumed < session.attempt_budget {
            let ordinal = session.attempts_consumed + 1;
            let prior = self
                .store
                .load_attempts(&session.id)
                .context("load attempt history")?;
            let context_text = build_context(&prior, ordinal).context("build attempt context")?;

            let attempt = self.run_attempt(&problem, &session, ordinal, &context_text);
            // Attempt rows are best-effort durable; losing one must not
            // abort the loop.
            if let Err(err) = self.store.append_attempt(&attempt) {
                warn!(session_id = %session.id, ordinal, error = %err, "failed to persist attempt");
            }

            let applied = apply_attempt(&mut session, attempt.score, Utc::now())
                .map_err(|err| anyhow!("session state update failed: {err}"))?;
            if let Some(entry) = &applied.improvement {
                info!(
                    session_id = %session.id,
                    delta = entry.delta,
                    strategy = entry.strategy.as_str(),
                    "score improved"
                );
                if let Err(err) = self.store.append_improvement(&session.id, entry) {
                    warn!(session_id = %session.id, error = %err, "failed to persist improvement entry");
                }
            }
            // Status updates gate termination, so they get retries.
            self.update_session_with_retry(&session)?;

            if applied.terminal {
                info!(session_id = %session.id, status = ?session.status, "session reached terminal state");
                break;
            }
        }

        self.build_report(&session, start)
    }

    /// One generation-evaluation cycle. Transient failures are folded into a
    /// failed attempt record; the ordinal is spent either way so the loop
    /// always terminates.
    fn run_attempt(
        &self,
        problem: &Problem,
        session: &Session,
        ordinal: u32,
        context_text: &str,
    ) -> Attempt {
        let mut errors = Vec::new();

        let (code, rationale) = match pipeline::generate(
            self.generator,
            problem,
            session.language,
            context_text,
            ordinal,
            self.pipeline,
        ) {
            Ok(output) => (
                extract(&output.code_source, session.language),
                output.rationale,
            ),
            Err(err) => {
                warn!(session_id = %session.id, ordinal, error = %format!("{err:#}"), "generation failed");
                errors.push(format!("generation failed: {err:#}"));
                (String::new(), String::new())
            }
        };

        let report = if errors.is_empty() {
            match self.evaluator.evaluate(problem, &code, session.language) {
                Ok(report) => report,
                Err(err) => {
                    warn!(session_id = %session.id, ordinal, error = %format!("{err:#}"), "evaluation failed");
                    errors.push(format!("evaluation failed: {err:#}"));
                    TestReport::empty()
                }
            }
        } else {
            TestReport::empty()
        };

        Attempt {
            session_id: session.id.clone(),
            number: ordinal,
            code,
            rationale,
            language: session.language,
            score: report.success_rate,
            failed_tests: report.failed_records(),
            errors,
        }
    }

    fn update_session_with_retry(&self, session: &Session) -> Result<()> {
        const RETRIES: u32 = 3;
        let mut last_err = None;
        for attempt in 1..=RETRIES {
            match self.store.update_session(session) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(session_id = %session.id, attempt, error = %err, "session update failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| anyhow!("session update failed"))
            .context("session update exhausted retries"))
    }

    fn build_report(&self, session: &Session, start: Instant) -> Result<SessionReport> {
        assemble_report(self.store, session, start.elapsed().as_millis() as u64)
    }
}

/// Assemble a report for a stored session without running any attempts.
pub fn report_session<S: Store>(store: &S, session_id: &str) -> Result<SessionReport> {
    let session = store
        .load_session(session_id)?
        .ok_or_else(|| anyhow!("unknown session '{session_id}'"))?;
    assemble_report(store, &session, 0)
}

fn assemble_report<S: Store>(
    store: &S,
    session: &Session,
    elapsed_ms: u64,
) -> Result<SessionReport> {
    let attempts = store
        .load_attempts(&session.id)
        .context("load attempts for report")?;
    let latest = attempts.last().map(|attempt| LatestAttempt {
        number: attempt.number,
        code: attempt.code.clone(),
        rationale: attempt.rationale.clone(),
        score: attempt.score,
        failed_tests: attempt.failed_tests.clone(),
    });
    let improvements = store
        .load_improvements(&session.id)
        .context("load improvements for report")?;
    let narrative = render_narrative(&improvements);

    Ok(SessionReport {
        session_id: session.id.clone(),
        status: session.status,
        attempts_consumed: session.attempts_consumed,
        best_score: session.best_score,
        latest,
        improvements,
        narrative,
        elapsed_ms,
    })
}

/// Render the improvement log as a human-readable narrative.
pub fn render_narrative(entries: &[ImprovementEntry]) -> String {
    if entries.is_empty() {
        return "no improvements recorded".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "attempt {} -> {}: +{:.1} ({})",
                entry.from_attempt,
                entry.to_attempt,
                entry.delta,
                entry.strategy.as_str()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn new_session_id(problem_id: &str) -> String {
    format!("{}-{}", problem_id, Utc::now().format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StrategyTag;

    #[test]
    fn narrative_renders_entries_in_order() {
        let entries = vec![
            ImprovementEntry {
                from_attempt: 0,
                to_attempt: 1,
                delta: 40.0,
                strategy: StrategyTag::SignificantBugFix,
            },
            ImprovementEntry {
                from_attempt: 2,
                to_attempt: 3,
                delta: 60.0,
                strategy: StrategyTag::ProblemSolved,
            },
        ];
        let narrative = render_narrative(&entries);
        assert_eq!(
            narrative,
            "attempt 0 -> 1: +40.0 (significant_bug_fix)\nattempt 2 -> 3: +60.0 (problem_solved)"
        );
    }

    #[test]
    fn empty_narrative_has_placeholder() {
        assert_eq!(render_narrative(&[]), "no improvements recorded");
    }

    #[test]
    fn session_locks_reject_reentrant_acquire() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s-1").expect("first acquire");
        let err = locks.acquire("s-1").expect_err("busy");
        assert!(err.downcast_ref::<SessionBusyError>().is_some());
        drop(guard);
        locks.acquire("s-1").expect("free after drop");
    }

    #[test]
    fn session_locks_are_per_session() {
        let locks = SessionLocks::new();
        let _one = locks.acquire("s-1").expect("s-1");
        let _two = locks.acquire("s-2").expect("s-2");
    }

    #[test]
    fn session_ids_embed_the_problem() {
        let id = new_session_id("two-sum");
        assert!(id.starts_with("two-sum-"));
    }
}
