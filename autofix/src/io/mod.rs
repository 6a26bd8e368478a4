//! Side-effecting operations: filesystem, archives, processes, terminal.

pub mod collaborator;
pub mod config;
pub mod console;
pub mod patcher;
pub mod process;
pub mod scanner;
pub mod snapshot;
