//! Pure, deterministic pipeline logic (no I/O).

pub mod diff;
pub mod file_state;
pub mod patch;
pub mod response;
pub mod types;
