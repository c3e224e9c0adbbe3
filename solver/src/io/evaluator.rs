//! Evaluation of candidate programs against problem test cases.
//!
//! Actual execution is delegated to an [`ExecutionService`] (submit-then-poll,
//! possibly completing immediately). This module's job is normalization: it
//! pre-cleans the candidate through the code extractor, renders one invocation
//! per test case from the problem's parameter-name mapping, polls with a fixed
//! interval under a per-attempt deadline, and folds heterogeneous outcomes
//! into uniform [`TestRecord`]s.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::extract::extract;
use crate::core::testcases::parse_invocation;
use crate::core::types::{Language, Problem, TestCase, TestRecord, TestReport};
use crate::io::process::run_command_with_timeout;

/// One runnable program plus its input, as submitted for execution.
#[derive(Debug, Clone)]
pub struct ExecJob {
    pub program: String,
    pub language: Language,
    pub stdin: String,
}

/// Raw result delivered by an execution service.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub time_ms: u64,
    pub memory_kb: u64,
    pub timed_out: bool,
}

/// Abstraction over sandboxed execution backends.
///
/// `submit` enqueues a job and returns its identifier; `poll` returns `None`
/// while the job is still running. Synchronous backends may complete the job
/// inside `submit` so the first poll succeeds.
pub trait ExecutionService {
    fn submit(&self, job: &ExecJob) -> Result<String>;
    fn poll(&self, job_id: &str) -> Result<Option<ExecOutcome>>;
}

/// Seam between the orchestrator and evaluation. Lets session tests script
/// whole test reports without an execution backend.
pub trait Evaluator {
    fn evaluate(&self, problem: &Problem, code: &str, language: Language) -> Result<TestReport>;
}

/// Client that turns an [`ExecutionService`] into an [`Evaluator`].
pub struct EvaluatorClient<S> {
    service: S,
    poll_interval: Duration,
    /// Total evaluation wait per attempt. A stuck execution fails this
    /// attempt's evaluation only, never the session.
    max_wait: Duration,
}

impl<S: ExecutionService> EvaluatorClient<S> {
    pub fn new(service: S, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            service,
            poll_interval,
            max_wait,
        }
    }

    fn await_outcome(&self, job_id: &str, deadline: Instant) -> Result<ExecOutcome> {
        loop {
            if let Some(outcome) = self.service.poll(job_id)? {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "evaluation exceeded the per-attempt wait of {:?}",
                    self.max_wait
                ));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn run_case(
        &self,
        problem: &Problem,
        clean_code: &str,
        language: Language,
        case: &TestCase,
        deadline: Instant,
    ) -> Result<TestRecord> {
        let invocation = match parse_invocation(problem, &case.input) {
            Ok(invocation) => invocation,
            Err(err) => {
                // A malformed test input fails that test, not the attempt.
                warn!(input = %case.input, error = %err, "unparsable test input");
                return Ok(failed_record(case, "invalid_input", Some(err.to_string())));
            }
        };
        let program = wrap_program(
            language,
            clean_code,
            &invocation.call_expr(&problem.entry_point),
        );
        let job_id = self
            .service
            .submit(&ExecJob {
                program,
                language,
                stdin: String::new(),
            })
            .context("submit execution job")?;
        let outcome = self.await_outcome(&job_id, deadline)?;
        Ok(normalize_outcome(case, &outcome))
    }
}

impl<S: ExecutionService> Evaluator for EvaluatorClient<S> {
    #[instrument(skip_all, fields(problem = %problem.id, cases = problem.test_cases.len()))]
    fn evaluate(&self, problem: &Problem, code: &str, language: Language) -> Result<TestReport> {
        // Defensive double-extraction: upstream stages may not have cleaned
        // the blob, and extraction is idempotent on clean code.
        let clean = extract(code, language);
        let deadline = Instant::now() + self.max_wait;

        let mut records = Vec::with_capacity(problem.test_cases.len());
        for case in &problem.test_cases {
            records.push(self.run_case(problem, &clean, language, case, deadline)?);
        }
        let report = TestReport::from_records(records);
        debug!(success_rate = report.success_rate, "evaluation complete");
        Ok(report)
    }
}

fn failed_record(case: &TestCase, status: &str, error: Option<String>) -> TestRecord {
    TestRecord {
        input: case.input.clone(),
        expected: case.expected.clone(),
        actual: String::new(),
        passed: false,
        time_ms: 0,
        memory_kb: 0,
        status: status.to_string(),
        error,
    }
}

/// Fold a raw execution outcome into the uniform test record shape.
fn normalize_outcome(case: &TestCase, outcome: &ExecOutcome) -> TestRecord {
    let actual = outcome.stdout.trim().to_string();
    let expected = case.expected.trim();
    let (passed, status) = if outcome.timed_out {
        (false, "timeout")
    } else if outcome.exit_code != Some(0) {
        (false, "runtime_error")
    } else if actual == expected {
        (true, "passed")
    } else {
        (false, "failed")
    };
    let stderr = outcome.stderr.trim();
    TestRecord {
        input: case.input.clone(),
        expected: case.expected.clone(),
        actual,
        passed,
        time_ms: outcome.time_ms,
        memory_kb: outcome.memory_kb,
        status: status.to_string(),
        error: (!stderr.is_empty()).then(|| stderr.to_string()),
    }
}

/// Append a minimal driver that invokes the entry point and prints the result.
fn wrap_program(language: Language, code: &str, call_expr: &str) -> String {
    match language {
        Language::Python => {
            if code.contains("class Solution") {
                format!(
                    "{code}\n\nif __name__ == \"__main__\":\n    print(Solution().{call_expr})\n"
                )
            } else {
                format!("{code}\n\nif __name__ == \"__main__\":\n    print({call_expr})\n")
            }
        }
        Language::JavaScript => format!("{code}\n\nconsole.log({call_expr});\n"),
        Language::Java => format!(
            "{code}\n\npublic class Main {{\n    public static void main(String[] args) {{\n        System.out.println(new Solution().{call_expr});\n    }}\n}}\n"
        ),
        Language::Cpp => format!(
            "{code}\n\nint main() {{\n    Solution solution;\n    std::cout << solution.{call_expr} << std::endl;\n    return 0;\n}}\n"
        ),
    }
}

/// Execution service that runs the program under a local interpreter command
/// (program on stdin). Jobs complete inside `submit`; the first poll returns
/// the stored outcome.
pub struct CommandExecutionService {
    commands: HashMap<Language, Vec<String>>,
    timeout: Duration,
    output_limit_bytes: usize,
    next_job: AtomicU64,
    outcomes: Mutex<HashMap<String, ExecOutcome>>,
}

impl CommandExecutionService {
    pub fn new(
        commands: HashMap<Language, Vec<String>>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            commands,
            timeout,
            output_limit_bytes,
            next_job: AtomicU64::new(1),
            outcomes: Mutex::new(HashMap::new()),
        }
    }
}

impl ExecutionService for CommandExecutionService {
    fn submit(&self, job: &ExecJob) -> Result<String> {
        let command = self
            .commands
            .get(&job.language)
            .ok_or_else(|| anyhow!("no run command configured for {}", job.language.as_str()))?;

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]);

        let started = Instant::now();
        let output = run_command_with_timeout(
            cmd,
            Some(job.program.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;
        let outcome = ExecOutcome {
            exit_code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            time_ms: started.elapsed().as_millis() as u64,
            memory_kb: 0,
            timed_out: output.timed_out,
        };

        let job_id = format!("job-{}", self.next_job.fetch_add(1, Ordering::Relaxed));
        self.outcomes
            .lock()
            .map_err(|_| anyhow!("outcome map poisoned"))?
            .insert(job_id.clone(), outcome);
        Ok(job_id)
    }

    fn poll(&self, job_id: &str) -> Result<Option<ExecOutcome>> {
        Ok(self
            .outcomes
            .lock()
            .map_err(|_| anyhow!("outcome map poisoned"))?
            .remove(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(cases: Vec<TestCase>) -> Problem {
        Problem {
            id: "add".to_string(),
            title: "Add".to_string(),
            difficulty: "easy".to_string(),
            description: "add two numbers".to_string(),
            starter_code: String::new(),
            entry_point: "add".to_string(),
            param_names: vec!["a".to_string(), "b".to_string()],
            test_cases: cases,
        }
    }

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Service that replays scripted outcomes after a fixed number of pending
    /// polls per job.
    struct ScriptedService {
        outcomes: Mutex<Vec<ExecOutcome>>,
        pending_polls: Mutex<HashMap<String, u32>>,
        polls_before_ready: u32,
    }

    impl ScriptedService {
        fn new(outcomes: Vec<ExecOutcome>, polls_before_ready: u32) -> Self {
            let mut reversed = outcomes;
            reversed.reverse();
            Self {
                outcomes: Mutex::new(reversed),
                pending_polls: Mutex::new(HashMap::new()),
                polls_before_ready,
            }
        }
    }

    impl ExecutionService for ScriptedService {
        fn submit(&self, _job: &ExecJob) -> Result<String> {
            let mut pending = self.pending_polls.lock().expect("lock");
            let id = format!("job-{}", pending.len() + 1);
            pending.insert(id.clone(), 0);
            Ok(id)
        }

        fn poll(&self, job_id: &str) -> Result<Option<ExecOutcome>> {
            let mut pending = self.pending_polls.lock().expect("lock");
            let count = pending.entry(job_id.to_string()).or_insert(0);
            *count += 1;
            if *count <= self.polls_before_ready {
                return Ok(None);
            }
            Ok(self.outcomes.lock().expect("lock").pop())
        }
    }

    fn ok_outcome(stdout: &str) -> ExecOutcome {
        ExecOutcome {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            time_ms: 3,
            memory_kb: 128,
            timed_out: false,
        }
    }

    #[test]
    fn evaluate_scores_passed_over_total() {
        let service = ScriptedService::new(vec![ok_outcome("3"), ok_outcome("999")], 0);
        let client = EvaluatorClient::new(service, Duration::from_millis(1), Duration::from_secs(5));
        let p = problem(vec![case("(1, 2)", "3"), case("(2, 2)", "4")]);

        let report = client
            .evaluate(&p, "def add(a, b):\n    return a + b", Language::Python)
            .expect("evaluate");
        assert_eq!(report.success_rate, 50.0);
        assert_eq!(report.records.len(), 2);
        assert!(report.records[0].passed);
        assert_eq!(report.records[1].status, "failed");
        assert_eq!(report.records[1].actual, "999");
    }

    #[test]
    fn evaluate_handles_zero_test_cases() {
        let service = ScriptedService::new(Vec::new(), 0);
        let client = EvaluatorClient::new(service, Duration::from_millis(1), Duration::from_secs(5));
        let p = problem(Vec::new());

        let report = client
            .evaluate(&p, "def add(a, b): return a + b", Language::Python)
            .expect("evaluate");
        assert_eq!(report.success_rate, 0.0);
        assert!(report.records.is_empty());
    }

    #[test]
    fn polling_waits_for_delayed_outcomes() {
        let service = ScriptedService::new(vec![ok_outcome("3")], 2);
        let client = EvaluatorClient::new(service, Duration::from_millis(1), Duration::from_secs(5));
        let p = problem(vec![case("(1, 2)", "3")]);

        let report = client
            .evaluate(&p, "def add(a, b): return a + b", Language::Python)
            .expect("evaluate");
        assert_eq!(report.success_rate, 100.0);
    }

    #[test]
    fn exceeding_max_wait_is_an_evaluation_error() {
        let service = ScriptedService::new(vec![ok_outcome("3")], u32::MAX);
        let client = EvaluatorClient::new(
            service,
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        let p = problem(vec![case("(1, 2)", "3")]);

        let err = client
            .evaluate(&p, "def add(a, b): return a + b", Language::Python)
            .expect_err("timeout");
        assert!(err.to_string().contains("per-attempt wait"));
    }

    #[test]
    fn runtime_error_and_timeout_records_fail() {
        let service = ScriptedService::new(
            vec![
                ExecOutcome {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "Traceback: boom".to_string(),
                    time_ms: 2,
                    memory_kb: 0,
                    timed_out: false,
                },
                ExecOutcome {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    time_ms: 5000,
                    memory_kb: 0,
                    timed_out: true,
                },
            ],
            0,
        );
        let client = EvaluatorClient::new(service, Duration::from_millis(1), Duration::from_secs(5));
        let p = problem(vec![case("(1, 2)", "3"), case("(2, 2)", "4")]);

        let report = client
            .evaluate(&p, "def add(a, b): raise Exception()", Language::Python)
            .expect("evaluate");
        assert_eq!(report.records[0].status, "runtime_error");
        assert_eq!(
            report.records[0].error.as_deref(),
            Some("Traceback: boom")
        );
        assert_eq!(report.records[1].status, "timeout");
        assert_eq!(report.success_rate, 0.0);
    }

    #[test]
    fn evaluate_precleans_fenced_code() {
        let service = ScriptedService::new(vec![ok_outcome("3")], 0);
        let client = EvaluatorClient::new(service, Duration::from_millis(1), Duration::from_secs(5));
        let p = problem(vec![case("(1, 2)", "3")]);

        // Fenced blob straight from a generator; the client must clean it
        // before building the harness program.
        let blob = "Here you go:\n```python\ndef add(a, b):\n    return a + b\n```\nDone.";
        let report = client.evaluate(&p, blob, Language::Python).expect("evaluate");
        assert_eq!(report.success_rate, 100.0);
    }

    #[test]
    fn wrap_program_builds_language_drivers() {
        let python = wrap_program(Language::Python, "def add(a, b): return a + b", "add(1, 2)");
        assert!(python.contains("print(add(1, 2))"));

        let python_class = wrap_program(
            Language::Python,
            "class Solution:\n    def add(self, a, b): return a + b",
            "add(1, 2)",
        );
        assert!(python_class.contains("Solution().add(1, 2)"));

        let js = wrap_program(Language::JavaScript, "function add(a, b) { return a + b; }", "add(1, 2)");
        assert!(js.contains("console.log(add(1, 2));"));

        let java = wrap_program(Language::Java, "class Solution { int add(int a, int b) { return a + b; } }", "add(1, 2)");
        assert!(java.contains("new Solution().add(1, 2)"));
    }

    #[test]
    fn command_service_runs_python() {
        let mut commands = HashMap::new();
        commands.insert(Language::Python, vec!["python3".to_string()]);
        let service =
            CommandExecutionService::new(commands, Duration::from_secs(10), 100_000);

        let job_id = service
            .submit(&ExecJob {
                program: "print(40 + 2)".to_string(),
                language: Language::Python,
                stdin: String::new(),
            })
            .expect("submit");
        let outcome = service.poll(&job_id).expect("poll").expect("ready");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "42");
    }

    #[test]
    fn command_service_rejects_unconfigured_language() {
        let service =
            CommandExecutionService::new(HashMap::new(), Duration::from_secs(1), 1024);
        let err = service
            .submit(&ExecJob {
                program: String::new(),
                language: Language::Java,
                stdin: String::new(),
            })
            .expect_err("unconfigured");
        assert!(err.to_string().contains("no run command"));
    }
}
