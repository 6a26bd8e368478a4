//! Per-file state machine for a pipeline run.
//!
//! ```text
//! Discovered -> Analyzed -> Skipped
//!                        -> Fixed -> Refactored -> Secured -> Applied | Rejected | Skipped
//! (any non-terminal state) -> Errored
//! ```

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::core::types::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Discovered,
    Analyzed,
    Skipped,
    Fixed,
    Refactored,
    Secured,
    Applied,
    Rejected,
    Errored,
}

impl FileState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileState::Skipped | FileState::Applied | FileState::Rejected | FileState::Errored
        )
    }

    /// State a file reaches once `stage` has produced its result.
    pub fn after_stage(stage: StageKind) -> FileState {
        match stage {
            StageKind::Analyzer => FileState::Analyzed,
            StageKind::Fix => FileState::Fixed,
            StageKind::Refactor => FileState::Refactored,
            StageKind::Security => FileState::Secured,
        }
    }

    pub fn can_transition_to(self, next: FileState) -> bool {
        use FileState::{
            Analyzed, Applied, Discovered, Errored, Fixed, Refactored, Rejected, Secured, Skipped,
        };
        if next == Errored {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Discovered, Analyzed)
                | (Analyzed, Skipped | Fixed)
                | (Fixed, Refactored)
                | (Refactored, Secured)
                | (Secured, Applied | Rejected | Skipped)
        )
    }
}

/// Tracks one file through the pipeline, rejecting out-of-order transitions.
#[derive(Debug, Clone)]
pub struct FileTracker {
    state: FileState,
}

impl Default for FileTracker {
    fn default() -> Self {
        Self {
            state: FileState::Discovered,
        }
    }
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn advance(&mut self, next: FileState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(anyhow!(
                "invalid file state transition {:?} -> {:?}",
                self.state,
                next
            ));
        }
        self.state = next;
        Ok(())
    }
}
