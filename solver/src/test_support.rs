//! Scripted fakes for exercising the session loop without a model backend or
//! interpreter. Compiled only with the `test-support` feature.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::types::{Language, Problem, TestCase, TestRecord, TestReport};
use crate::io::evaluator::Evaluator;
use crate::io::generator::{CompletionRequest, Generator};
use crate::io::problems::ProblemSource;

/// In-memory problem source.
pub struct StaticProblemSource {
    problems: BTreeMap<String, Problem>,
}

impl StaticProblemSource {
    pub fn new(problems: Vec<Problem>) -> Self {
        Self {
            problems: problems
                .into_iter()
                .map(|problem| (problem.id.clone(), problem))
                .collect(),
        }
    }
}

impl ProblemSource for StaticProblemSource {
    fn fetch(&self, problem_id: &str) -> Result<Option<Problem>> {
        Ok(self.problems.get(problem_id).cloned())
    }
}

/// Generator that replays a fixed sequence of completions.
///
/// Every request is recorded for assertion; running past the script is an
/// error, mirroring a backend outage.
pub struct ScriptedGenerator {
    outputs: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new(outputs: Vec<Result<String>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script each completion as a fenced python block around the given body.
    pub fn from_codes(codes: &[&str]) -> Self {
        Self::new(
            codes
                .iter()
                .map(|code| Ok(format!("```python\n{code}\n```")))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Generator for ScriptedGenerator {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted generator exhausted")))
    }
}

/// Evaluator that replays a fixed sequence of reports.
pub struct ScriptedEvaluator {
    reports: Mutex<VecDeque<Result<TestReport>>>,
    evaluated: Mutex<Vec<String>>,
}

impl ScriptedEvaluator {
    pub fn new(reports: Vec<Result<TestReport>>) -> Self {
        Self {
            reports: Mutex::new(reports.into_iter().collect()),
            evaluated: Mutex::new(Vec::new()),
        }
    }

    /// Script one report per score, synthesized out of ten test records.
    pub fn from_scores(scores: &[f64]) -> Self {
        Self::new(scores.iter().map(|&score| Ok(report(score))).collect())
    }

    /// The code blobs passed to each `evaluate` call, in order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().expect("evaluated lock").clone()
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate(&self, _problem: &Problem, code: &str, _language: Language) -> Result<TestReport> {
        self.evaluated
            .lock()
            .expect("evaluated lock")
            .push(code.to_string());
        self.reports
            .lock()
            .expect("reports lock")
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted evaluator exhausted")))
    }
}

/// Synthesize a report whose success rate is `score` out of ten records.
///
/// `score` must be a multiple of 10 in 0..=100.
pub fn report(score: f64) -> TestReport {
    let passed = (score / 10.0).round() as usize;
    assert!(passed <= 10, "score must be 0-100");
    let records = (0..10)
        .map(|index| {
            let ok = index < passed;
            TestRecord {
                input: format!("({index})"),
                expected: index.to_string(),
                actual: if ok { index.to_string() } else { "wrong".to_string() },
                passed: ok,
                time_ms: 1,
                memory_kb: 256,
                status: if ok { "passed" } else { "failed" }.to_string(),
                error: None,
            }
        })
        .collect();
    TestReport::from_records(records)
}

/// A small problem record usable across scenarios.
pub fn sample_problem(id: &str) -> Problem {
    Problem {
        id: id.to_string(),
        title: "Two Sum".to_string(),
        difficulty: "easy".to_string(),
        description: "Find two indices that sum to target.".to_string(),
        starter_code: String::new(),
        entry_point: "two_sum".to_string(),
        param_names: vec!["nums".to_string(), "target".to_string()],
        test_cases: vec![TestCase {
            input: "([2,7,11,15], 9)".to_string(),
            expected: "[0, 1]".to_string(),
        }],
    }
}
