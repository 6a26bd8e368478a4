//! Stable exit codes for autofix CLI commands.

/// Command succeeded; for `run`, every file was fixed or skipped.
pub const OK: i32 = 0;
/// Invalid arguments or config, or the run was aborted.
pub const INVALID: i32 = 1;
/// `run` finished but at least one file errored.
pub const FILE_ERRORS: i32 = 2;
