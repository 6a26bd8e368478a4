//! Snapshot-first, multi-stage code remediation CLI.
//!
//! `autofix run` archives the workspace into `.autofix-snapshots/`, then sends
//! every source file through analyze, fix, refactor and security stages and
//! applies the resulting patch, immediately (`--autopilot`) or after review.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;

use autofix::core::diff::diff;
use autofix::core::patch::preview;
use autofix::core::types::{Mode, RunSummary};
use autofix::exit_codes;
use autofix::io::collaborator::CommandCollaborator;
use autofix::io::config::{AutofixConfig, CONFIG_FILE_NAME, load_config, starter_config, write_config};
use autofix::io::console::{ConsoleObserver, TerminalReviewer};
use autofix::io::patcher::apply_to_file;
use autofix::io::snapshot::{SnapshotManager, create_snapshot, list_snapshots};
use autofix::logging;
use autofix::pipeline::{NoopObserver, RunObserver, run_autofix};

#[derive(Parser)]
#[command(
    name = "autofix",
    version,
    about = "Snapshot-first, multi-stage code remediation"
)]
struct Cli {
    /// Workspace root.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (defaults to `<root>/autofix.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter `autofix.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Snapshot the workspace, then remediate every scanned file.
    Run {
        /// Apply patches without asking.
        #[arg(long)]
        autopilot: bool,
        /// Print the run summary as JSON instead of progress lines.
        #[arg(long)]
        json: bool,
    },
    /// Manage workspace snapshots.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },
    /// Print a unified diff turning OLD into NEW.
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Path shown in the `a/` and `b/` headers (defaults to NEW).
        #[arg(long)]
        label: Option<String>,
    },
    /// Render a patch file for review.
    Preview { patch: PathBuf },
    /// Apply a patch file to FILE (exact match only).
    Apply { file: PathBuf, patch: PathBuf },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Archive the workspace now.
    Create,
    /// List snapshots, newest first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Extract a snapshot into a new temporary directory.
    Restore { id: String },
    /// Delete all but the newest snapshots.
    Cleanup {
        /// Number of snapshots to keep (defaults to `snapshot.keep`).
        #[arg(long)]
        keep: Option<usize>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE_NAME));
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Run { autopilot, json } => {
            let mode = if autopilot {
                Mode::Autopilot
            } else {
                Mode::Interactive
            };
            cmd_run(&cli.root, &load_config(&config_path)?, mode, json)
        }
        Command::Snapshot { action } => {
            cmd_snapshot(&cli.root, &load_config(&config_path)?, action)
        }
        Command::Diff { old, new, label } => cmd_diff(&old, &new, label),
        Command::Preview { patch } => {
            let text = read(&patch)?;
            print!("{}", preview(&text)?);
            Ok(exit_codes::OK)
        }
        Command::Apply { file, patch } => {
            let original = read(&file)?;
            let patch_text = read(&patch)?;
            apply_to_file(&file, &original, &patch_text)?;
            println!("applied {} to {}", patch.display(), file.display());
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &starter_config())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, config: &AutofixConfig, mode: Mode, json: bool) -> Result<i32> {
    let collaborator = CommandCollaborator::new(config.collaborator.clone().unwrap_or_default());
    let stdin = io::stdin();
    // Keep stdout parseable when it carries the JSON summary.
    let prompts: Box<dyn Write> = if json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let mut reviewer = TerminalReviewer::new(stdin.lock(), prompts);
    let mut console = ConsoleObserver::new(io::stdout());
    let mut quiet = NoopObserver;
    let observer: &mut dyn RunObserver = if json { &mut quiet } else { &mut console };

    match run_autofix(root, mode, config, &collaborator, &mut reviewer, observer) {
        Ok(summary) => {
            print_summary(&summary, json)?;
            Ok(if summary.has_errors() {
                exit_codes::FILE_ERRORS
            } else {
                exit_codes::OK
            })
        }
        Err(abort) => {
            eprintln!("autofix: {abort}");
            if let Some(partial) = abort.partial_summary() {
                print_summary(partial, json)?;
            }
            Ok(exit_codes::INVALID)
        }
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("serialize summary")?
        );
        return Ok(());
    }
    println!("snapshot: {}", summary.snapshot_id);
    println!(
        "scanned {}, fixed {}, skipped {}, errored {}",
        summary.files_scanned, summary.files_fixed, summary.files_skipped, summary.files_errored
    );
    Ok(())
}

fn cmd_snapshot(root: &Path, config: &AutofixConfig, action: SnapshotCommand) -> Result<i32> {
    match action {
        SnapshotCommand::Create => {
            let snapshot = create_snapshot(root, &config.snapshot)?;
            println!("{}", snapshot.id);
        }
        SnapshotCommand::List { json } => {
            let snapshots = list_snapshots(root)?;
            if json {
                let rows: Vec<_> = snapshots
                    .iter()
                    .map(|s| {
                        json!({
                            "id": s.id,
                            "created_at": s.created_at.to_rfc3339(),
                            "size_bytes": s.size_bytes,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for s in &snapshots {
                    println!("{}\t{}\t{}", s.id, s.created_at.to_rfc3339(), s.size_bytes);
                }
            }
        }
        SnapshotCommand::Restore { id } => {
            let dest = SnapshotManager::new(root, &config.snapshot).restore(&id)?;
            println!("{}", dest.display());
        }
        SnapshotCommand::Cleanup { keep } => {
            let keep = keep.unwrap_or(config.snapshot.keep);
            let removed = SnapshotManager::new(root, &config.snapshot).cleanup(keep)?;
            for id in &removed {
                println!("removed {id}");
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_diff(old: &Path, new: &Path, label: Option<String>) -> Result<i32> {
    let old_text = read(old)?;
    let new_text = read(new)?;
    let label = label.unwrap_or_else(|| new.to_string_lossy().replace('\\', "/"));
    print!("{}", diff(&old_text, &new_text, &label));
    Ok(exit_codes::OK)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults_to_interactive() {
        let cli = Cli::parse_from(["autofix", "run"]);
        assert!(matches!(
            cli.command,
            Command::Run {
                autopilot: false,
                json: false
            }
        ));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_global_root_after_subcommand() {
        let cli = Cli::parse_from(["autofix", "snapshot", "cleanup", "--keep", "2", "--root", "/w"]);
        assert_eq!(cli.root, PathBuf::from("/w"));
        assert!(matches!(
            cli.command,
            Command::Snapshot {
                action: SnapshotCommand::Cleanup { keep: Some(2) }
            }
        ));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["autofix", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }
}
