//! Command-line entry point for the solver.
//!
//! Thin wiring only: loads configuration, assembles the file-backed problem
//! source, command-backed generator and execution service, and the JSON
//! store, then delegates to the session orchestrator and prints its report.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use solver::core::types::Language;
use solver::io::config::{SolverConfig, load_config};
use solver::io::evaluator::{CommandExecutionService, EvaluatorClient};
use solver::io::generator::CommandGenerator;
use solver::io::problems::FileProblemSource;
use solver::io::store::JsonStore;
use solver::session::{RunRequest, SessionLocks, SessionRunner, report_session};

#[derive(Parser)]
#[command(name = "solver", version, about = "Iterative code-solving engine")]
struct Cli {
    /// Path to the solver config file.
    #[arg(long, default_value = "solver.toml")]
    config: PathBuf,

    /// Directory holding session state.
    #[arg(long, default_value = ".solver")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a bounded improvement session against a problem.
    Run {
        problem_id: String,

        /// Path to the TOML problem file.
        #[arg(long, default_value = "problems.toml")]
        problems: PathBuf,

        #[arg(long, default_value = "python")]
        language: Language,

        /// Attempt budget; defaults to the configured value.
        #[arg(long)]
        budget: Option<u32>,

        /// Resume an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the stored report of a session.
    Report { session_id: String },
}

fn main() {
    solver::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = JsonStore::new(&cli.data_dir);

    match cli.command {
        Command::Run {
            problem_id,
            problems,
            language,
            budget,
            session,
        } => {
            let problem_source = FileProblemSource::load(&problems)?;
            let generator = CommandGenerator::new(
                config.generator.command.clone(),
                Duration::from_secs(config.generation_timeout_secs),
                config.output_limit_bytes,
            )?;
            let service = CommandExecutionService::new(
                run_commands(&config)?,
                Duration::from_secs(config.eval_timeout_secs),
                config.output_limit_bytes,
            );
            let evaluator = EvaluatorClient::new(
                service,
                Duration::from_millis(config.poll_interval_ms),
                Duration::from_secs(config.eval_timeout_secs),
            );
            let locks = SessionLocks::new();

            let runner = SessionRunner {
                problems: &problem_source,
                generator: &generator,
                evaluator: &evaluator,
                store: &store,
                locks: &locks,
                pipeline: &config.pipeline,
            };
            let report = runner.run(&RunRequest {
                problem_id,
                language,
                attempt_budget: budget.unwrap_or(config.attempt_budget_default),
                session_id: session,
            })?;
            print_json(&report)
        }
        Command::Report { session_id } => {
            let report = report_session(&store, &session_id)?;
            print_json(&report)
        }
    }
}

fn run_commands(config: &SolverConfig) -> Result<HashMap<Language, Vec<String>>> {
    let mut commands = HashMap::new();
    for (name, command) in &config.run_commands {
        let language: Language = name
            .parse()
            .map_err(|err| anyhow!("run_commands.{name}: {err}"))?;
        commands.insert(language, command.clone());
    }
    Ok(commands)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{payload}");
    Ok(())
}
