//! Generator abstraction for completion backends.
//!
//! The [`Generator`] trait decouples the pipeline from the actual model
//! backend. Tests use scripted generators that return predetermined outputs;
//! the reference backend spawns a configured local command with the prompt on
//! stdin (any model shim that reads stdin and writes a completion to stdout).

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::run_command_with_timeout;
use crate::stream::{RawChunk, RawChunkIter};

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Role-scoped system instruction.
    pub system: String,
    /// User prompt body.
    pub prompt: String,
    /// Sampling temperature hint; backends may ignore it.
    pub temperature: f32,
}

/// Abstraction over completion backends.
pub trait Generator {
    /// Produce a single completion for the request.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Produce a chunked completion stream.
    ///
    /// The default adapter wraps the blocking call into a two-chunk stream
    /// (one narrative chunk plus the terminal marker) for backends without
    /// native streaming.
    fn stream(&self, request: &CompletionRequest) -> Result<RawChunkIter> {
        let completion = self.complete(request)?;
        Ok(Box::new(
            vec![Ok(RawChunk::Narrative(completion)), Ok(RawChunk::Done)].into_iter(),
        ))
    }
}

/// Generator that spawns a local command.
///
/// The system instruction and prompt are fed on stdin separated by a blank
/// line; stdout is the completion.
#[derive(Debug)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(anyhow!("generator command must be a non-empty array"));
        }
        Ok(Self {
            command,
            timeout,
            output_limit_bytes,
        })
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(command = %self.command[0], temperature = request.temperature))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        cmd.env("SOLVER_TEMPERATURE", format!("{}", request.temperature));

        let stdin = format!("{}\n\n{}", request.system.trim_end(), request.prompt);
        let output = run_command_with_timeout(
            cmd,
            Some(stdin.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator exited with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        debug!(bytes = output.stdout.len(), "generator completed");
        Ok(output.stdout_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        let err = CommandGenerator::new(Vec::new(), Duration::from_secs(1), 1024)
            .expect_err("empty command");
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn command_generator_returns_stdout() {
        let generator = CommandGenerator::new(
            vec!["cat".to_string(), "-".to_string()],
            Duration::from_secs(5),
            10_000,
        )
        .expect("generator");
        let completion = generator
            .complete(&CompletionRequest {
                system: "you are a solver".to_string(),
                prompt: "solve it".to_string(),
                temperature: 0.2,
            })
            .expect("complete");
        assert!(completion.contains("you are a solver"));
        assert!(completion.contains("solve it"));
    }

    #[test]
    fn default_stream_adapter_wraps_completion() {
        struct Fixed;
        impl Generator for Fixed {
            fn complete(&self, _request: &CompletionRequest) -> Result<String> {
                Ok("answer".to_string())
            }
        }
        let chunks: Vec<_> = Fixed
            .stream(&CompletionRequest {
                system: String::new(),
                prompt: String::new(),
                temperature: 0.0,
            })
            .expect("stream")
            .collect::<Result<Vec<_>>>()
            .expect("chunks");
        assert_eq!(
            chunks,
            vec![RawChunk::Narrative("answer".to_string()), RawChunk::Done]
        );
    }
}
