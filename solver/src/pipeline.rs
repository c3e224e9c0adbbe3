//! Generation pipeline: turns a problem plus feedback context into a
//! candidate solution blob and a rationale.
//!
//! Two modes share one contract. Direct mode issues a single completion call.
//! Staged mode runs a fixed chain of specialized roles (analyze -> plan ->
//! implement -> review) where each stage consumes the prior stage's output;
//! only the implementer's output is eligible for code extraction, all stage
//! outputs are concatenated into the rationale. A failure in any stage fails
//! the whole pipeline call.

use anyhow::{Context as _, Result};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, instrument};

use crate::core::types::{Language, Problem};
use crate::io::generator::{CompletionRequest, Generator};
use crate::stream::{self, SolutionStream};

const DIRECT_TEMPLATE: &str = include_str!("prompts/direct.md");
const ANALYZER_TEMPLATE: &str = include_str!("prompts/analyzer.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const IMPLEMENTER_TEMPLATE: &str = include_str!("prompts/implementer.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");

/// How the pipeline produces a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    Direct,
    Staged,
}

/// Per-stage sampling temperatures. Tuning parameters, not correctness ones:
/// implementation runs cooler than analysis and planning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTemperatures {
    pub analysis: f32,
    pub planning: f32,
    pub implementation: f32,
    pub review: f32,
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self {
            analysis: 0.7,
            planning: 0.7,
            implementation: 0.2,
            review: 0.5,
        }
    }
}

/// Pipeline configuration, embedded in [`crate::io::config::SolverConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    /// Use the generator's chunked stream for direct-mode generation.
    pub streaming: bool,
    pub temperatures: StageTemperatures,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Direct,
            streaming: false,
            temperatures: StageTemperatures::default(),
        }
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    /// Blob from which code is extracted (implementer output in staged mode).
    pub code_source: String,
    /// Narrative across all stages.
    pub rationale: String,
}

/// Pipeline roles. Each carries its own system instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Analyzer,
    Planner,
    Implementer,
    Reviewer,
}

impl Stage {
    fn system(self) -> &'static str {
        match self {
            Stage::Analyzer => {
                "You are a competitive-programming analyst. You classify problems, \
                 surface constraints, and enumerate edge cases. You never write code."
            }
            Stage::Planner => {
                "You are an algorithm strategist. You pick a concrete algorithmic \
                 approach and decompose it into steps. You never write code."
            }
            Stage::Implementer => {
                "You are a careful programmer. You produce one complete, runnable \
                 program that follows the given plan exactly."
            }
            Stage::Reviewer => {
                "You are a code reviewer. You critique an implementation for \
                 correctness and complexity. You never rewrite the code."
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            Stage::Analyzer => "analyzer",
            Stage::Planner => "planner",
            Stage::Implementer => "implementer",
            Stage::Reviewer => "reviewer",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Stage::Analyzer => "Analysis",
            Stage::Planner => "Plan",
            Stage::Implementer => "Implementation",
            Stage::Reviewer => "Review",
        }
    }

    fn temperature(self, temperatures: &StageTemperatures) -> f32 {
        match self {
            Stage::Analyzer => temperatures.analysis,
            Stage::Planner => temperatures.planning,
            Stage::Implementer => temperatures.implementation,
            Stage::Reviewer => temperatures.review,
        }
    }
}

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    for (name, source) in [
        ("direct", DIRECT_TEMPLATE),
        ("analyzer", ANALYZER_TEMPLATE),
        ("planner", PLANNER_TEMPLATE),
        ("implementer", IMPLEMENTER_TEMPLATE),
        ("reviewer", REVIEWER_TEMPLATE),
    ] {
        env.add_template(name, source)
            .expect("bundled prompt template should be valid");
    }
    env
});

/// Produce a candidate for `problem` given feedback `context_text`.
#[instrument(skip_all, fields(problem = %problem.id, ordinal, mode = ?config.mode))]
pub fn generate<G: Generator>(
    generator: &G,
    problem: &Problem,
    language: Language,
    context_text: &str,
    ordinal: u32,
    config: &PipelineConfig,
) -> Result<GenerationOutput> {
    match config.mode {
        PipelineMode::Direct => generate_direct(generator, problem, language, context_text, ordinal, config),
        PipelineMode::Staged => generate_staged(generator, problem, language, context_text, ordinal, config),
    }
}

fn generate_direct<G: Generator>(
    generator: &G,
    problem: &Problem,
    language: Language,
    context_text: &str,
    ordinal: u32,
    config: &PipelineConfig,
) -> Result<GenerationOutput> {
    let prompt = render(
        "direct",
        context! {
            title => problem.title,
            difficulty => problem.difficulty,
            description => problem.description,
            starter_code => non_empty(&problem.starter_code),
            language => language.as_str(),
            context => context_text,
            ordinal => ordinal,
        },
    )?;
    let request = CompletionRequest {
        system: Stage::Implementer.system().to_string(),
        prompt,
        temperature: Stage::Implementer.temperature(&config.temperatures),
    };

    if config.streaming {
        let mut solution = open_stream(generator, &request, language)?;
        let (reasoning, code) = stream::drain(&mut solution);
        // The streamed code channel is best-effort; fall back to the full
        // transcript when the filter suppressed everything.
        let code_source = if code.trim().is_empty() {
            format!("{reasoning}{code}")
        } else {
            code
        };
        debug!(reasoning_bytes = reasoning.len(), code_bytes = code_source.len(), "streamed generation complete");
        return Ok(GenerationOutput {
            code_source,
            rationale: reasoning,
        });
    }

    let blob = generator.complete(&request).context("direct generation")?;
    Ok(GenerationOutput {
        code_source: blob.clone(),
        rationale: blob,
    })
}

fn generate_staged<G: Generator>(
    generator: &G,
    problem: &Problem,
    language: Language,
    context_text: &str,
    ordinal: u32,
    config: &PipelineConfig,
) -> Result<GenerationOutput> {
    let analysis = run_stage(
        generator,
        Stage::Analyzer,
        config,
        render(
            "analyzer",
            context! {
                title => problem.title,
                difficulty => problem.difficulty,
                description => problem.description,
                context => context_text,
            },
        )?,
    )?;
    let plan = run_stage(
        generator,
        Stage::Planner,
        config,
        render(
            "planner",
            context! {
                title => problem.title,
                difficulty => problem.difficulty,
                description => problem.description,
                analysis => analysis,
                context => context_text,
            },
        )?,
    )?;
    let implementation = run_stage(
        generator,
        Stage::Implementer,
        config,
        render(
            "implementer",
            context! {
                title => problem.title,
                difficulty => problem.difficulty,
                description => problem.description,
                starter_code => non_empty(&problem.starter_code),
                language => language.as_str(),
                analysis => analysis,
                plan => plan,
                context => context_text,
                ordinal => ordinal,
            },
        )?,
    )?;
    let review = run_stage(
        generator,
        Stage::Reviewer,
        config,
        render(
            "reviewer",
            context! {
                title => problem.title,
                difficulty => problem.difficulty,
                description => problem.description,
                implementation => implementation,
            },
        )?,
    )?;

    let rationale = [
        (Stage::Analyzer, &analysis),
        (Stage::Planner, &plan),
        (Stage::Implementer, &implementation),
        (Stage::Reviewer, &review),
    ]
    .iter()
    .map(|(stage, output)| format!("## {}\n\n{}\n", stage.heading(), output.trim()))
    .collect::<Vec<_>>()
    .join("\n");

    Ok(GenerationOutput {
        code_source: implementation,
        rationale,
    })
}

fn run_stage<G: Generator>(
    generator: &G,
    stage: Stage,
    config: &PipelineConfig,
    prompt: String,
) -> Result<String> {
    debug!(stage = stage.name(), "running pipeline stage");
    generator
        .complete(&CompletionRequest {
            system: stage.system().to_string(),
            prompt,
            temperature: stage.temperature(&config.temperatures),
        })
        .with_context(|| format!("{} stage failed", stage.name()))
}

/// Open a tagged stream for the request (direct mode only).
pub fn open_stream<G: Generator>(
    generator: &G,
    request: &CompletionRequest,
    language: Language,
) -> Result<SolutionStream> {
    let upstream = generator.stream(request).context("open generation stream")?;
    Ok(SolutionStream::new(upstream, language))
}

fn render(name: &str, ctx: minijinja::Value) -> Result<String> {
    let template = ENGINE
        .get_template(name)
        .expect("bundled templates are registered at startup");
    template
        .render(ctx)
        .with_context(|| format!("render {name} prompt"))
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
