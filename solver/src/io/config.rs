//! Solver configuration loaded from a TOML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineConfig;

/// Solver configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Attempt budget used when the caller does not pass one explicitly.
    pub attempt_budget_default: u32,

    /// Wall-clock budget for one generation call in seconds.
    pub generation_timeout_secs: u64,

    /// Total evaluation wait per attempt in seconds (bounds the poll loop).
    pub eval_timeout_secs: u64,

    /// Fixed interval between evaluation polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Truncate captured process stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub pipeline: PipelineConfig,

    pub generator: GeneratorConfig,

    /// Interpreter command per language for the process-backed execution
    /// service, e.g. `python = ["python3"]`.
    pub run_commands: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command to execute for completions (prompt on stdin, completion on
    /// stdout).
    pub command: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["solver-model".to_string()],
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        let mut run_commands = BTreeMap::new();
        run_commands.insert("python".to_string(), vec!["python3".to_string()]);
        run_commands.insert("javascript".to_string(), vec!["node".to_string()]);
        Self {
            attempt_budget_default: 5,
            generation_timeout_secs: 5 * 60,
            eval_timeout_secs: 2 * 60,
            poll_interval_ms: 250,
            output_limit_bytes: 100_000,
            pipeline: PipelineConfig::default(),
            generator: GeneratorConfig::default(),
            run_commands,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.attempt_budget_default == 0 {
            return Err(anyhow!("attempt_budget_default must be > 0"));
        }
        if self.generation_timeout_secs == 0 {
            return Err(anyhow!("generation_timeout_secs must be > 0"));
        }
        if self.eval_timeout_secs == 0 {
            return Err(anyhow!("eval_timeout_secs must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        for (language, command) in &self.run_commands {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!(
                    "run_commands.{language} must be a non-empty array"
                ));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SolverConfig::default()`.
pub fn load_config(path: &Path) -> Result<SolverConfig> {
    if !path.exists() {
        let cfg = SolverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SolverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SolverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
