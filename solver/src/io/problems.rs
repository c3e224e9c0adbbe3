//! Problem source backed by a TOML file.
//!
//! Problems are external, read-only records. The file format is a flat list:
//!
//! ```toml
//! [[problems]]
//! id = "two-sum"
//! title = "Two Sum"
//! difficulty = "easy"
//! description = "..."
//! entry_point = "two_sum"
//! param_names = ["nums", "target"]
//!
//! [[problems.test_cases]]
//! input = "([2,7,11,15], 9)"
//! expected = "[0, 1]"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::core::types::Problem;

/// Source of problem records, injected into the orchestrator.
pub trait ProblemSource {
    fn fetch(&self, problem_id: &str) -> Result<Option<Problem>>;
}

#[derive(Debug, Deserialize)]
struct ProblemFile {
    #[serde(default)]
    problems: Vec<Problem>,
}

/// In-memory problem source loaded from a TOML file.
#[derive(Debug)]
pub struct FileProblemSource {
    problems: BTreeMap<String, Problem>,
}

impl FileProblemSource {
    /// Load and validate all problems from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read problems {}", path.display()))?;
        let file: ProblemFile = toml::from_str(&contents)
            .with_context(|| format!("parse problems {}", path.display()))?;

        let mut problems = BTreeMap::new();
        for problem in file.problems {
            validate_problem(&problem)
                .with_context(|| format!("invalid problem '{}'", problem.id))?;
            if problems.insert(problem.id.clone(), problem).is_some() {
                return Err(anyhow!("duplicate problem id in {}", path.display()));
            }
        }
        Ok(Self { problems })
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let file: ProblemFile = toml::from_str(contents).context("parse problems")?;
        let mut problems = BTreeMap::new();
        for problem in file.problems {
            validate_problem(&problem)?;
            if problems.insert(problem.id.clone(), problem).is_some() {
                bail!("duplicate problem id");
            }
        }
        Ok(Self { problems })
    }
}

impl ProblemSource for FileProblemSource {
    fn fetch(&self, problem_id: &str) -> Result<Option<Problem>> {
        Ok(self.problems.get(problem_id).cloned())
    }
}

fn validate_problem(problem: &Problem) -> Result<()> {
    if problem.id.trim().is_empty() {
        bail!("id must be non-empty");
    }
    if !problem
        .id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("id must use [a-z0-9_-] only");
    }
    if problem.description.trim().is_empty() {
        bail!("description must be non-empty");
    }
    if problem.entry_point.trim().is_empty() {
        bail!("entry_point must be non-empty");
    }
    Ok(())
}
