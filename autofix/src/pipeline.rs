//! `autofix run`: snapshot, scan, then drive every file through the stages.
//!
//! Files are processed strictly one after another. A failure inside one file
//! is recorded against that file and the run moves on; only configuration,
//! snapshot and scan failures, or a collaborator failure that would repeat
//! for every file (auth, quota), stop the run.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::agents::{AgentStage, StageInput, default_stages};
use crate::core::file_state::{FileState, FileTracker};
use crate::core::patch::preview;
use crate::core::types::{Mode, PatchOutcome, RunSummary, SourceFile, StageResult};
use crate::error::{ConfigError, GenerateError, RunAbort};
use crate::io::collaborator::Collaborator;
use crate::io::config::AutofixConfig;
use crate::io::patcher::apply_to_file;
use crate::io::scanner::{load_source, probe_root, relative_path, scan};
use crate::io::snapshot::SnapshotManager;

/// Answer to an interactive review prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Apply,
    Skip,
    /// Show the rendered patch, then ask again.
    Preview,
}

/// Decides, per file, whether a final patch gets applied in interactive mode.
pub trait Reviewer {
    fn decide(&mut self, relative_path: &str, patch: &str) -> Result<ReviewDecision>;

    fn show_preview(&mut self, relative_path: &str, preview: &str) -> Result<()>;
}

/// Progress callbacks. Every method defaults to doing nothing.
pub trait RunObserver {
    /// `index` is 1-based.
    fn on_file_progress(&mut self, _index: usize, _total: usize, _relative_path: &str) {}

    fn on_file_fixed(&mut self, _relative_path: &str) {}

    fn on_file_skipped(&mut self, _relative_path: &str, _reason: &str) {}

    fn on_file_error(&mut self, _relative_path: &str, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// How a file left the pipeline when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileDisposition {
    Applied,
    Skipped(&'static str),
    Rejected,
}

/// Run the full remediation pipeline over `root`.
///
/// Returns a summary for every run that was not aborted, even if every file
/// errored.
#[instrument(skip_all, fields(root = %root.display(), mode = ?mode))]
pub fn run_autofix(
    root: &Path,
    mode: Mode,
    config: &AutofixConfig,
    collaborator: &dyn Collaborator,
    reviewer: &mut dyn Reviewer,
    observer: &mut dyn RunObserver,
) -> Result<RunSummary, RunAbort> {
    config.validate_collaborator()?;
    collaborator.check_ready()?;
    probe_root(root).map_err(|source| RunAbort::Root {
        path: root.to_path_buf(),
        source,
    })?;
    let stages = default_stages().map_err(|err| ConfigError::Invalid(format!("{err:#}")))?;

    let snapshots = SnapshotManager::new(root, &config.snapshot);
    let snapshot = snapshots.create().map_err(RunAbort::Snapshot)?;
    match snapshots.cleanup(config.snapshot.keep) {
        Ok(removed) => debug!(removed = removed.len(), "retention applied"),
        Err(err) => warn!(err = %format!("{err:#}"), "snapshot retention failed"),
    }

    let files = scan(root, &config.scan).map_err(RunAbort::Scan)?;
    info!(files = files.len(), snapshot = %snapshot.id, "starting run");

    let mut summary = RunSummary::new(snapshot.id, files.len());
    let delay = Duration::from_millis(config.pipeline.inter_file_delay_ms);
    let total = files.len();

    for (idx, path) in files.iter().enumerate() {
        if idx > 0 && !delay.is_zero() {
            thread::sleep(delay);
        }
        let rel = relative_path(root, path);
        observer.on_file_progress(idx + 1, total, &rel);

        let mut tracker = FileTracker::new();
        let outcome = load_source(root, path).and_then(|source| {
            process_file(&source, mode, &stages, collaborator, &mut *reviewer, &mut tracker)
        });
        match outcome {
            Ok(FileDisposition::Applied) => {
                info!(path = %rel, "patch applied");
                summary.record(&rel, FileState::Applied, None);
                observer.on_file_fixed(&rel);
            }
            Ok(FileDisposition::Skipped(reason)) => {
                debug!(path = %rel, reason, "file skipped");
                summary.record(&rel, FileState::Skipped, Some(reason.to_string()));
                observer.on_file_skipped(&rel, reason);
            }
            Ok(FileDisposition::Rejected) => {
                debug!(path = %rel, "patch rejected by reviewer");
                summary.record(&rel, FileState::Rejected, Some("rejected".to_string()));
                observer.on_file_skipped(&rel, "rejected");
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(path = %rel, err = %message, "file failed");
                if let Err(state_err) = tracker.advance(FileState::Errored) {
                    debug!(err = %state_err, "file already finished");
                }
                summary.record(&rel, FileState::Errored, Some(message.clone()));
                observer.on_file_error(&rel, &message);

                if let Some(generate) = err.downcast_ref::<GenerateError>()
                    && generate.is_systemic()
                {
                    warn!(path = %rel, "collaborator failure is systemic, aborting run");
                    return Err(RunAbort::Collaborator {
                        path: rel,
                        source: generate.clone(),
                        partial: Box::new(summary),
                    });
                }
            }
        }
    }

    info!(
        fixed = summary.files_fixed,
        skipped = summary.files_skipped,
        errored = summary.files_errored,
        "run finished"
    );
    Ok(summary)
}

fn process_file(
    source: &SourceFile,
    mode: Mode,
    stages: &[Box<dyn AgentStage>],
    collaborator: &dyn Collaborator,
    reviewer: &mut dyn Reviewer,
    tracker: &mut FileTracker,
) -> Result<FileDisposition> {
    let rel = source.relative_path.as_str();
    let mut upstream: Option<StageResult> = None;
    let mut final_patch: Option<String> = None;

    for stage in stages {
        let input = StageInput {
            relative_path: rel,
            upstream: upstream.as_ref(),
            source: &source.text,
        };
        let result = stage.run(collaborator, &input)?;
        tracker.advance(FileState::after_stage(stage.kind()))?;

        match &result {
            StageResult::Analysis(report) => {
                debug!(path = rel, counts = ?report.counts(), "analyzed");
                if !report.has_problems() {
                    tracker.advance(FileState::Skipped)?;
                    return Ok(FileDisposition::Skipped("no problems reported"));
                }
            }
            StageResult::Patch(outcome) => {
                if let Some(patch) = outcome.patch() {
                    final_patch = Some(patch.to_string());
                }
            }
        }

        // A stage without a proposal hands the latest proposal on instead.
        let carried = match (&result, &final_patch) {
            (StageResult::Patch(outcome), Some(latest)) if outcome.patch().is_none() => {
                Some(StageResult::Patch(PatchOutcome::Proposed(latest.clone())))
            }
            _ => None,
        };
        upstream = Some(carried.unwrap_or(result));
    }

    let Some(patch) = final_patch else {
        tracker.advance(FileState::Skipped)?;
        return Ok(FileDisposition::Skipped("no patch proposed"));
    };

    if mode == Mode::Interactive {
        loop {
            match reviewer.decide(rel, &patch)? {
                ReviewDecision::Apply => break,
                ReviewDecision::Skip => {
                    tracker.advance(FileState::Rejected)?;
                    return Ok(FileDisposition::Rejected);
                }
                ReviewDecision::Preview => {
                    let rendered = preview(&patch)?;
                    reviewer.show_preview(rel, &rendered)?;
                }
            }
        }
    }

    apply_to_file(&source.absolute_path, &source.text, &patch)?;
    tracker.advance(FileState::Applied)?;
    Ok(FileDisposition::Applied)
}
