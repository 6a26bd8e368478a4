//! Error taxonomy shared by the pipeline.
//!
//! Most code propagates `anyhow::Error`; the types here are the ones callers
//! branch on (via `downcast_ref` or by matching a returned enum).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::types::RunSummary;

/// Invalid or incomplete configuration. Always aborts before any work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("collaborator is not configured (missing [collaborator] section)")]
    MissingCollaborator,
    #[error("collaborator.command must be a non-empty array")]
    MissingCommand,
    #[error("collaborator.model must be set")]
    MissingModel,
    #[error("credential environment variable {var} is not set")]
    MissingCredential { var: String },
    #[error("{0}")]
    Invalid(String),
}

/// Failure reported by the text-generation collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("collaborator rejected credentials: {0}")]
    Auth(String),
    #[error("collaborator quota exhausted: {0}")]
    Quota(String),
    #[error("collaborator rate limited: {0}")]
    RateLimit(String),
    #[error("collaborator transport failure: {0}")]
    Transport(String),
    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerateError {
    /// Auth and quota failures would fail every remaining file the same way.
    pub fn is_systemic(&self) -> bool {
        matches!(self, GenerateError::Auth(_) | GenerateError::Quota(_))
    }
}

/// A patch that cannot be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed patch: {0}")]
    Format(String),
    #[error("patch conflict in hunk {hunk} at line {line}: {reason}")]
    Conflict {
        hunk: usize,
        line: usize,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {id} not found")]
    NotFound { id: String },
    #[error("invalid snapshot id {0:?}")]
    InvalidId(String),
}

/// A run-level failure: the run stopped and reports exactly one cause.
#[derive(Debug, Error)]
pub enum RunAbort {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("workspace root {path:?} is not accessible: {source}")]
    Root {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("snapshot failed, no files were modified: {0:#}")]
    Snapshot(anyhow::Error),
    #[error("scan failed: {0:#}")]
    Scan(anyhow::Error),
    #[error("run aborted while processing {path}: {source}")]
    Collaborator {
        path: String,
        source: GenerateError,
        /// Files finished before the abort.
        partial: Box<RunSummary>,
    },
}

impl RunAbort {
    pub fn partial_summary(&self) -> Option<&RunSummary> {
        match self {
            RunAbort::Collaborator { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_and_quota_are_systemic() {
        assert!(GenerateError::Auth("401".to_string()).is_systemic());
        assert!(GenerateError::Quota("billing".to_string()).is_systemic());
        assert!(!GenerateError::RateLimit("429".to_string()).is_systemic());
        assert!(!GenerateError::Transport("reset".to_string()).is_systemic());
        assert!(!GenerateError::Timeout(Duration::from_secs(1)).is_systemic());
    }

    #[test]
    fn generate_error_survives_anyhow_downcast() {
        let err: anyhow::Error = GenerateError::Quota("exhausted".to_string()).into();
        let err = err.context("fix stage");
        let found = err.downcast_ref::<GenerateError>().expect("downcast");
        assert!(found.is_systemic());
    }
}
