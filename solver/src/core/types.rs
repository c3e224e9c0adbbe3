//! Shared deterministic types for solver core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a problem-solving session.
///
/// `InProgress` is the only non-terminal state. Once a session reaches
/// `Solved` or `MaxAttemptsReached` no further attempts may be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Solved,
    MaxAttemptsReached,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Solved | SessionStatus::MaxAttemptsReached)
    }
}

/// Target language of generated programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
}

impl Language {
    /// Fence info strings that identify a code block for this language.
    pub fn fence_tags(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["python", "py", "python3"],
            Language::JavaScript => &["javascript", "js"],
            Language::Java => &["java"],
            Language::Cpp => &["cpp", "c++", "cxx"],
        }
    }

    /// Line prefixes that mark a plausible start of a program.
    ///
    /// Matched against unindented lines only: top-level constructs start at
    /// column zero in all supported languages.
    pub fn anchor_prefixes(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["import ", "from ", "def ", "class ", "@"],
            Language::JavaScript => &[
                "import ", "export ", "function ", "class ", "const ", "let ", "var ",
            ],
            Language::Java => &["package ", "import ", "public class", "class ", "final class"],
            Language::Cpp => &[
                "#include",
                "using namespace",
                "template",
                "class ",
                "struct ",
                "int main",
            ],
        }
    }

    /// Whether `text` contains the top-level construct expected of a complete
    /// program in this language.
    pub fn has_top_level_construct(self, text: &str) -> bool {
        match self {
            Language::Python => text.contains("def ") || text.contains("class "),
            Language::JavaScript => {
                text.contains("function ") || text.contains("class ") || text.contains("=>")
            }
            Language::Java => text.contains("class "),
            Language::Cpp => {
                text.contains("int main") || text.contains("class ") || text.contains("struct ")
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(format!("unknown language '{other}'")),
        }
    }
}

/// One bounded problem-solving effort. Unit of resumability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub problem_id: String,
    pub language: Language,
    pub status: SessionStatus,
    /// Best score seen so far (0-100).
    pub best_score: f64,
    /// Attempts recorded so far. Never exceeds `attempt_budget`.
    pub attempts_consumed: u32,
    pub attempt_budget: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One generation-evaluation cycle within a session. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub session_id: String,
    /// 1-based ordinal, strictly increasing, no gaps.
    pub number: u32,
    pub code: String,
    pub rationale: String,
    pub language: Language,
    /// Percentage of test cases passed (0-100).
    pub score: f64,
    pub failed_tests: Vec<TestRecord>,
    pub errors: Vec<String>,
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    pub time_ms: u64,
    pub memory_kb: u64,
    pub status: String,
    pub error: Option<String>,
}

/// Normalized result of evaluating one attempt against all test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub records: Vec<TestRecord>,
    pub success_rate: f64,
}

impl TestReport {
    /// Build a report from normalized records.
    ///
    /// `success_rate` is `passed / total * 100`, defined as 0 when there are
    /// zero test cases.
    pub fn from_records(records: Vec<TestRecord>) -> Self {
        let total = records.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            let passed = records.iter().filter(|record| record.passed).count();
            passed as f64 / total as f64 * 100.0
        };
        Self {
            records,
            success_rate,
        }
    }

    pub fn empty() -> Self {
        Self::from_records(Vec::new())
    }

    /// Records for tests that did not pass.
    pub fn failed_records(&self) -> Vec<TestRecord> {
        self.records
            .iter()
            .filter(|record| !record.passed)
            .cloned()
            .collect()
    }
}

/// Classification of a score improvement (human-readable narrative only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    ProblemSolved,
    MajorAlgorithmFix,
    SignificantBugFix,
    MinorImprovement,
    NoImprovement,
}

impl StrategyTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyTag::ProblemSolved => "problem_solved",
            StrategyTag::MajorAlgorithmFix => "major_algorithm_fix",
            StrategyTag::SignificantBugFix => "significant_bug_fix",
            StrategyTag::MinorImprovement => "minor_improvement",
            StrategyTag::NoImprovement => "no_improvement",
        }
    }
}

/// Recorded when an attempt strictly improves on the session's best score.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementEntry {
    /// Ordinal of the preceding attempt (0 when the first attempt improves
    /// on the initial best score of zero).
    pub from_attempt: u32,
    pub to_attempt: u32,
    pub delta: f64,
    pub strategy: StrategyTag,
}

/// One test case as stored on a problem record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Textual tuple of arguments, e.g. `([2,7,11,15], 9)`.
    pub input: String,
    pub expected: String,
}

/// Read-only problem record from the external problem source.
///
/// Consumed as an opaque input; the solver does not validate its schema
/// beyond what loading requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub description: String,
    #[serde(default)]
    pub starter_code: String,
    /// Name of the function or method the evaluation harness invokes.
    pub entry_point: String,
    #[serde(default)]
    pub param_names: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Latest stored attempt, as surfaced on the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestAttempt {
    pub number: u32,
    pub code: String,
    pub rationale: String,
    pub score: f64,
    pub failed_tests: Vec<TestRecord>,
}

/// Final report returned to the caller of `run_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub attempts_consumed: u32,
    pub best_score: f64,
    pub latest: Option<LatestAttempt>,
    pub improvements: Vec<ImprovementEntry>,
    /// Human-readable rendering of `improvements`.
    pub narrative: String,
    /// Wall-clock time spent in this invocation.
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(passed: bool) -> TestRecord {
        TestRecord {
            input: "(1)".to_string(),
            expected: "1".to_string(),
            actual: if passed { "1" } else { "2" }.to_string(),
            passed,
            time_ms: 1,
            memory_kb: 0,
            status: if passed { "passed" } else { "failed" }.to_string(),
            error: None,
        }
    }

    #[test]
    fn success_rate_is_zero_for_empty_report() {
        let report = TestReport::from_records(Vec::new());
        assert_eq!(report.success_rate, 0.0);
    }

    #[test]
    fn success_rate_is_hundred_only_when_all_pass() {
        let all = TestReport::from_records(vec![record(true), record(true)]);
        assert_eq!(all.success_rate, 100.0);

        let some = TestReport::from_records(vec![record(true), record(false)]);
        assert!(some.success_rate < 100.0);
        assert_eq!(some.success_rate, 50.0);
    }

    #[test]
    fn failed_records_filters_passes() {
        let report = TestReport::from_records(vec![record(true), record(false)]);
        let failed = report.failed_records();
        assert_eq!(failed.len(), 1);
        assert!(!failed[0].passed);
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::Solved.is_terminal());
        assert!(SessionStatus::MaxAttemptsReached.is_terminal());
    }

    #[test]
    fn language_parses_aliases() {
        assert_eq!("py".parse::<Language>(), Ok(Language::Python));
        assert_eq!("c++".parse::<Language>(), Ok(Language::Cpp));
        assert!("cobol".parse::<Language>().is_err());
    }
}
