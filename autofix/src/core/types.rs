//! Shared deterministic types for the remediation pipeline.
//!
//! These types define stable contracts between stages, the patch engine and the
//! orchestrator. They carry no I/O and serialize to a stable JSON shape.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::file_state::FileState;

/// A source file discovered by the scanner and read once at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub absolute_path: PathBuf,
    /// Path relative to the workspace root, always `/`-separated.
    pub relative_path: String,
    pub text: String,
}

/// One problem reported by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub line: u32,
    /// Severity on a 1–10 scale.
    pub severity: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Counts derived from an [`AnalysisReport`] when it is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub problems: usize,
    /// Problems with severity >= 7.
    pub high_severity: usize,
    pub required_fixes: usize,
    pub recommended_refactors: usize,
}

/// Structured analyzer output. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    problems: Vec<Problem>,
    required_fixes: Vec<String>,
    recommended_refactors: Vec<String>,
    counts: ReportCounts,
}

impl AnalysisReport {
    pub fn new(
        problems: Vec<Problem>,
        required_fixes: Vec<String>,
        recommended_refactors: Vec<String>,
    ) -> Self {
        let problems: Vec<Problem> = problems
            .into_iter()
            .map(|mut problem| {
                problem.severity = problem.severity.clamp(1, 10);
                problem
            })
            .collect();
        let counts = ReportCounts {
            problems: problems.len(),
            high_severity: problems.iter().filter(|p| p.severity >= 7).count(),
            required_fixes: required_fixes.len(),
            recommended_refactors: recommended_refactors.len(),
        };
        Self {
            problems,
            required_fixes,
            recommended_refactors,
            counts,
        }
    }

    /// Report used whenever analyzer output cannot be understood.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn required_fixes(&self) -> &[String] {
        &self.required_fixes
    }

    pub fn recommended_refactors(&self) -> &[String] {
        &self.recommended_refactors
    }

    pub fn counts(&self) -> ReportCounts {
        self.counts
    }

    pub fn has_problems(&self) -> bool {
        !self.problems.is_empty()
    }
}

/// Result of a patch-producing stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// A unified diff that parsed successfully.
    Proposed(String),
    /// Nothing usable came back (explicit no-change, empty or malformed output).
    NoPatch,
    /// The security stage explicitly confirmed there is nothing to fix.
    ConfirmedClean,
}

impl PatchOutcome {
    pub fn patch(&self) -> Option<&str> {
        match self {
            PatchOutcome::Proposed(diff) => Some(diff),
            PatchOutcome::NoPatch | PatchOutcome::ConfirmedClean => None,
        }
    }
}

/// Output of any [`crate::agents::AgentStage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Analysis(AnalysisReport),
    Patch(PatchOutcome),
}

impl StageResult {
    pub fn patch(&self) -> Option<&str> {
        match self {
            StageResult::Analysis(_) => None,
            StageResult::Patch(outcome) => outcome.patch(),
        }
    }
}

/// Pipeline stages in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Analyzer,
    Fix,
    Refactor,
    Security,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Analyzer => "analyzer",
            StageKind::Fix => "fix",
            StageKind::Refactor => "refactor",
            StageKind::Security => "security",
        }
    }
}

/// Execution mode of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pause for an Apply/Skip/Preview decision once the final patch is known.
    Interactive,
    /// Apply patches immediately.
    Autopilot,
}

/// Final disposition of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub relative_path: String,
    pub state: FileState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregated outcome of a run, built incrementally by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_fixed: usize,
    pub files_errored: usize,
    pub files_skipped: usize,
    pub snapshot_id: String,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn new(snapshot_id: impl Into<String>, files_scanned: usize) -> Self {
        Self {
            files_scanned,
            snapshot_id: snapshot_id.into(),
            ..Self::default()
        }
    }

    /// Record a terminal file state and bump the matching counter.
    pub fn record(&mut self, relative_path: &str, state: FileState, message: Option<String>) {
        match state {
            FileState::Applied => self.files_fixed += 1,
            FileState::Errored => self.files_errored += 1,
            FileState::Skipped | FileState::Rejected => self.files_skipped += 1,
            _ => {}
        }
        self.files.push(FileReport {
            relative_path: relative_path.to_string(),
            state,
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.files_errored > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(severity: u8) -> Problem {
        Problem {
            line: 3,
            severity,
            kind: "unused-import".to_string(),
            message: "unused import".to_string(),
        }
    }

    #[test]
    fn report_clamps_severity_and_counts() {
        let report = AnalysisReport::new(
            vec![problem(0), problem(9), problem(42)],
            vec!["remove import".to_string()],
            Vec::new(),
        );
        let severities: Vec<u8> = report.problems().iter().map(|p| p.severity).collect();
        assert_eq!(severities, vec![1, 9, 10]);
        assert_eq!(
            report.counts(),
            ReportCounts {
                problems: 3,
                high_severity: 2,
                required_fixes: 1,
                recommended_refactors: 0,
            }
        );
    }

    #[test]
    fn summary_counts_rejected_as_skipped() {
        let mut summary = RunSummary::new("snap-1", 4);
        summary.record("a.rs", FileState::Applied, None);
        summary.record("b.rs", FileState::Skipped, None);
        summary.record("c.rs", FileState::Rejected, None);
        summary.record("d.rs", FileState::Errored, Some("boom".to_string()));
        assert_eq!(summary.files_fixed, 1);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.files_errored, 1);
        assert!(summary.has_errors());
        assert_eq!(summary.files.len(), 4);
    }
}
