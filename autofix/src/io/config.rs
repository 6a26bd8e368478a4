//! Autofix configuration stored in `autofix.toml` at the workspace root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file name, resolved against the workspace root.
pub const CONFIG_FILE_NAME: &str = "autofix.toml";

/// Autofix configuration (TOML).
///
/// Consumed as a single value at run start. Missing fields default to values
/// that work for snapshot commands; `run` additionally needs a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AutofixConfig {
    /// Text-generation backend. Absent until configured.
    pub collaborator: Option<CollaboratorConfig>,
    pub pipeline: PipelineConfig,
    pub snapshot: SnapshotConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Command to spawn; `{model}` in any argument is replaced by `model`.
    pub command: Vec<String>,
    /// Model identifier handed to the command.
    pub model: String,
    /// Environment variable that must hold the backend credential, if any.
    pub api_key_env: Option<String>,
    /// Per-call wall-clock limit in seconds.
    pub timeout_secs: u64,
    /// Truncate collaborator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            model: String::new(),
            api_key_env: None,
            timeout_secs: 120,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause between files, in milliseconds. `0` disables the pause.
    pub inter_file_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_file_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Number of newest snapshots kept by retention cleanup.
    pub keep: usize,
    /// Directory names left out of archives (matched at any depth).
    pub exclude_dirs: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            keep: 10,
            exclude_dirs: default_ignored_dirs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Globs (relative to the root) a file must match to be scanned.
    pub include: Vec<String>,
    /// Globs (relative to the root) that drop an otherwise included file.
    pub exclude: Vec<String>,
    /// Directory names never descended into.
    pub exclude_dirs: Vec<String>,
    /// Files larger than this are not scanned.
    pub max_file_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let include = [
            "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp",
            "cs", "rb", "php", "swift",
        ]
        .iter()
        .map(|ext| format!("**/*.{ext}"))
        .collect();
        Self {
            include,
            exclude: vec!["**/*.min.js".to_string()],
            exclude_dirs: default_ignored_dirs(),
            max_file_bytes: 1024 * 1024,
        }
    }
}

fn default_ignored_dirs() -> Vec<String> {
    [
        ".git",
        ".hg",
        ".svn",
        "node_modules",
        "target",
        "dist",
        "build",
        "out",
        "vendor",
        ".venv",
        "venv",
        "__pycache__",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AutofixConfig {
    /// Checks that apply to every command.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot.keep == 0 {
            return Err(anyhow!("snapshot.keep must be > 0"));
        }
        if self.scan.include.is_empty() {
            return Err(anyhow!("scan.include must list at least one glob"));
        }
        if self.scan.max_file_bytes == 0 {
            return Err(anyhow!("scan.max_file_bytes must be > 0"));
        }
        if let Some(collaborator) = &self.collaborator {
            if collaborator.timeout_secs == 0 {
                return Err(anyhow!("collaborator.timeout_secs must be > 0"));
            }
            if collaborator.output_limit_bytes == 0 {
                return Err(anyhow!("collaborator.output_limit_bytes must be > 0"));
            }
        }
        Ok(())
    }

    /// Checks required before a pipeline run may start.
    pub fn validate_collaborator(&self) -> Result<&CollaboratorConfig, ConfigError> {
        let collaborator = self
            .collaborator
            .as_ref()
            .ok_or(ConfigError::MissingCollaborator)?;
        if collaborator.command.is_empty() || collaborator.command[0].trim().is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        if collaborator.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        self.validate()
            .map_err(|err| ConfigError::Invalid(format!("{err:#}")))?;
        Ok(collaborator)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AutofixConfig::default()`.
pub fn load_config(path: &Path) -> Result<AutofixConfig> {
    if !path.exists() {
        let cfg = AutofixConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AutofixConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AutofixConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Starter config written by `autofix init`.
pub fn starter_config() -> AutofixConfig {
    AutofixConfig {
        collaborator: Some(CollaboratorConfig {
            command: vec![
                "llm".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
            ],
            model: "set-me".to_string(),
            ..CollaboratorConfig::default()
        }),
        ..AutofixConfig::default()
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
