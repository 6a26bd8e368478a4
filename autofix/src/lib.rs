//! Multi-stage, collaborator-driven code remediation.
//!
//! A run snapshots the workspace, scans it for source files and sends each file
//! through four stages (analyze, fix, refactor, security). The last proposed
//! unified diff is applied, immediately or after review. The crate keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (response parsing, patch engine,
//!   diff synthesis, per-file state machine). No I/O.
//! - **[`io`]**: Side-effecting operations (config, scanning, snapshots,
//!   collaborator processes, file writes, terminal).
//! - **[`agents`]**: The pipeline stages and their instructions.
//!
//! [`pipeline`] coordinates the three to implement `autofix run`.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ConfigError, GenerateError, PatchError, RunAbort, SnapshotError};
pub use io::snapshot::{Snapshot, SnapshotManager, create_snapshot, list_snapshots};
pub use pipeline::{NoopObserver, ReviewDecision, Reviewer, RunObserver, run_autofix};
