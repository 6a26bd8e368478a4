//! Text-generation collaborator abstraction.
//!
//! The [`Collaborator`] trait decouples the pipeline stages from the backend
//! that actually produces text. [`CommandCollaborator`] drives an external
//! command; tests use scripted collaborators that never spawn processes.

use std::env;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigError, GenerateError};
use crate::io::config::CollaboratorConfig;
use crate::io::process::run_command_with_timeout;

/// Placeholder in `collaborator.command` replaced by the configured model.
const MODEL_PLACEHOLDER: &str = "{model}";

static AUTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(401|403|unauthori[sz]ed|forbidden|invalid api key|authentication|permission denied)\b",
    )
    .expect("auth regex")
});
static QUOTA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(quota|insufficient[_ ]credit|billing|credit balance)").expect("quota regex")
});
static RATE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\b429\b|rate[ _-]?limit|too many requests|overloaded)")
        .expect("rate limit regex")
});

/// Abstraction over text-generation backends.
pub trait Collaborator {
    /// Produce text for `instruction` applied to `subject` (usually source code).
    ///
    /// Failures are [`GenerateError`]s wrapped in `anyhow::Error`.
    fn generate(&self, instruction: &str, subject: &str) -> Result<String>;

    /// Verify the backend can be used at all, before any work starts.
    fn check_ready(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Collaborator that spawns the configured command once per call.
///
/// The prompt (instruction followed by the fenced subject) goes to stdin and
/// the response is read from stdout.
#[derive(Debug, Clone)]
pub struct CommandCollaborator {
    config: CollaboratorConfig,
}

impl CommandCollaborator {
    pub fn new(config: CollaboratorConfig) -> Self {
        Self { config }
    }

    fn build_command(&self) -> Result<Command, GenerateError> {
        let mut args = self
            .config
            .command
            .iter()
            .map(|arg| arg.replace(MODEL_PLACEHOLDER, &self.config.model));
        let program = args
            .next()
            .ok_or_else(|| GenerateError::Transport("collaborator command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

impl Collaborator for CommandCollaborator {
    #[instrument(skip_all, fields(model = %self.config.model, timeout_secs = self.config.timeout_secs))]
    fn generate(&self, instruction: &str, subject: &str) -> Result<String> {
        let cmd = self.build_command()?;
        let prompt = compose_prompt(instruction, subject);
        debug!(prompt_bytes = prompt.len(), "invoking collaborator command");

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.into_bytes()),
            self.timeout(),
            self.config.output_limit_bytes,
        )
        .map_err(|err| GenerateError::Transport(format!("{err:#}")))?;

        if output.timed_out {
            warn!("collaborator command timed out");
            return Err(GenerateError::Timeout(self.timeout()).into());
        }
        if !output.status.success() {
            let stderr = output.stderr_lossy();
            let err = classify_failure(output.status.code(), &stderr);
            warn!(exit_code = ?output.status.code(), err = %err, "collaborator command failed");
            return Err(err.into());
        }

        if output.stdout_truncated > 0 {
            warn!(
                dropped_bytes = output.stdout_truncated,
                "collaborator response exceeded output limit"
            );
            return Err(GenerateError::Transport(format!(
                "response exceeded output_limit_bytes ({}), {} bytes dropped",
                self.config.output_limit_bytes, output.stdout_truncated
            ))
            .into());
        }

        info!(response_bytes = output.stdout.len(), "collaborator responded");
        Ok(output.stdout_lossy())
    }

    fn check_ready(&self) -> Result<(), ConfigError> {
        if let Some(var) = &self.config.api_key_env {
            match env::var(var) {
                Ok(value) if !value.trim().is_empty() => {}
                _ => return Err(ConfigError::MissingCredential { var: var.clone() }),
            }
        }
        Ok(())
    }
}

fn compose_prompt(instruction: &str, subject: &str) -> String {
    let mut prompt = String::with_capacity(instruction.len() + subject.len() + 16);
    prompt.push_str(instruction.trim_end());
    prompt.push_str("\n\n```\n");
    prompt.push_str(subject);
    if !subject.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n");
    prompt
}

/// Map a failed command's stderr onto a [`GenerateError`] kind.
pub fn classify_failure(exit_code: Option<i32>, stderr: &str) -> GenerateError {
    let detail = last_line(stderr)
        .map(str::to_string)
        .unwrap_or_else(|| format!("exit status {exit_code:?}"));
    if QUOTA_RE.is_match(stderr) {
        GenerateError::Quota(detail)
    } else if RATE_LIMIT_RE.is_match(stderr) {
        GenerateError::RateLimit(detail)
    } else if AUTH_RE.is_match(stderr) {
        GenerateError::Auth(detail)
    } else {
        GenerateError::Transport(detail)
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}
