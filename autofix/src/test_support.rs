//! Test-only collaborators, reviewers, observers and workspaces.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tempfile::TempDir;

use crate::error::GenerateError;
use crate::io::collaborator::Collaborator;
use crate::io::config::{AutofixConfig, CollaboratorConfig, PipelineConfig};
use crate::pipeline::{ReviewDecision, Reviewer, RunObserver};

/// One `generate` call as seen by a [`ScriptedCollaborator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub instruction: String,
    pub subject: String,
}

type CallHook = Box<dyn Fn(&RecordedCall)>;

/// Collaborator that replays queued responses in order and records calls.
///
/// Running out of responses is reported as a transport failure.
pub struct ScriptedCollaborator {
    responses: RefCell<VecDeque<Result<String, GenerateError>>>,
    calls: RefCell<Vec<RecordedCall>>,
    hook: Option<CallHook>,
}

impl ScriptedCollaborator {
    pub fn new(responses: Vec<Result<String, GenerateError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::new(Vec::new()),
            hook: None,
        }
    }

    /// Run `hook` at the start of every call, before the response is produced.
    pub fn with_hook(mut self, hook: impl Fn(&RecordedCall) + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Collaborator for ScriptedCollaborator {
    fn generate(&self, instruction: &str, subject: &str) -> Result<String> {
        let call = RecordedCall {
            instruction: instruction.to_string(),
            subject: subject.to_string(),
        };
        if let Some(hook) = &self.hook {
            hook(&call);
        }
        self.calls.borrow_mut().push(call);
        let next = self.responses.borrow_mut().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(err)) => Err(err.into()),
            None => Err(GenerateError::Transport("scripted responses exhausted".to_string()).into()),
        }
    }
}

/// Reviewer that replays queued decisions; once exhausted it skips.
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    decisions: VecDeque<ReviewDecision>,
    pub asked: Vec<String>,
    pub previews: Vec<(String, String)>,
}

impl ScriptedReviewer {
    pub fn new(decisions: Vec<ReviewDecision>) -> Self {
        Self {
            decisions: decisions.into(),
            ..Self::default()
        }
    }
}

impl Reviewer for ScriptedReviewer {
    fn decide(&mut self, relative_path: &str, _patch: &str) -> Result<ReviewDecision> {
        self.asked.push(relative_path.to_string());
        Ok(self.decisions.pop_front().unwrap_or(ReviewDecision::Skip))
    }

    fn show_preview(&mut self, relative_path: &str, preview: &str) -> Result<()> {
        self.previews
            .push((relative_path.to_string(), preview.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Progress {
        index: usize,
        total: usize,
        path: String,
    },
    Fixed(String),
    Skipped {
        path: String,
        reason: String,
    },
    Error {
        path: String,
        message: String,
    },
}

/// Observer that keeps every callback in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<ObservedEvent>,
}

impl RunObserver for RecordingObserver {
    fn on_file_progress(&mut self, index: usize, total: usize, relative_path: &str) {
        self.events.push(ObservedEvent::Progress {
            index,
            total,
            path: relative_path.to_string(),
        });
    }

    fn on_file_fixed(&mut self, relative_path: &str) {
        self.events
            .push(ObservedEvent::Fixed(relative_path.to_string()));
    }

    fn on_file_skipped(&mut self, relative_path: &str, reason: &str) {
        self.events.push(ObservedEvent::Skipped {
            path: relative_path.to_string(),
            reason: reason.to_string(),
        });
    }

    fn on_file_error(&mut self, relative_path: &str, message: &str) {
        self.events.push(ObservedEvent::Error {
            path: relative_path.to_string(),
            message: message.to_string(),
        });
    }
}

/// Temporary workspace root with helpers for seeding files.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temp workspace")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.path(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Config with a collaborator configured and no inter-file delay.
    pub fn config(&self) -> AutofixConfig {
        AutofixConfig {
            collaborator: Some(CollaboratorConfig {
                command: vec!["scripted".to_string()],
                model: "scripted-model".to_string(),
                ..CollaboratorConfig::default()
            }),
            pipeline: PipelineConfig {
                inter_file_delay_ms: 0,
            },
            ..AutofixConfig::default()
        }
    }
}

/// Analyzer response listing `(line, severity, message)` problems.
pub fn analysis_response(problems: &[(u32, u8, &str)]) -> String {
    let problems: Vec<_> = problems
        .iter()
        .map(|(line, severity, message)| {
            json!({"line": line, "severity": severity, "type": "defect", "message": message})
        })
        .collect();
    let fixes: Vec<String> = problems
        .iter()
        .map(|_| "fix the reported defect".to_string())
        .collect();
    json!({
        "problems": problems,
        "required_fixes": fixes,
        "recommended_refactors": [],
    })
    .to_string()
}
