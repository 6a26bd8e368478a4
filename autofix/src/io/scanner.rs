//! Workspace discovery: which files a run looks at, in which order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::types::SourceFile;
use crate::io::config::ScanConfig;
use crate::io::snapshot::HISTORY_DIR_NAME;

/// Fail early if `root` is not a readable directory.
pub fn probe_root(root: &Path) -> io::Result<()> {
    let meta = fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            "workspace root is not a directory",
        ));
    }
    fs::read_dir(root)?;
    Ok(())
}

/// List scannable files under `root`, sorted by relative path.
///
/// Symlinks are not followed. Unreadable subdirectories are skipped with a
/// warning; an unreadable root is an error.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn scan(root: &Path, config: &ScanConfig) -> Result<Vec<PathBuf>> {
    let include = compile_globset(&config.include).context("compile scan.include")?;
    let exclude = compile_globset(&config.exclude).context("compile scan.exclude")?;

    let mut found: Vec<(String, PathBuf)> = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_pruned_dir(entry, &config.exclude_dirs));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("walk {}", root.display()));
            }
            Err(err) => {
                warn!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_path(root, entry.path());
        if !include.is_match(&rel) || exclude.is_match(&rel) {
            continue;
        }
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!(path = %rel, err = %err, "skipping file without metadata");
                continue;
            }
        };
        if size > config.max_file_bytes {
            debug!(path = %rel, size, "skipping oversized file");
            continue;
        }
        found.push((rel, entry.into_path()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    debug!(files = found.len(), "scan complete");
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Read one scanned file. Non UTF-8 content is an error for that file only.
pub fn load_source(root: &Path, path: &Path) -> Result<SourceFile> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| anyhow!("{} is not valid UTF-8", path.display()))?;
    Ok(SourceFile {
        absolute_path: path.to_path_buf(),
        relative_path: relative_path(root, path),
        text,
    })
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Directories never descended into: the snapshot history plus `exclude_dirs`.
pub(crate) fn is_pruned_dir(entry: &DirEntry, exclude_dirs: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == HISTORY_DIR_NAME || exclude_dirs.iter().any(|dir| *dir == name)
}

fn compile_globset(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for g in globs {
        builder.add(Glob::new(g).with_context(|| format!("invalid glob: {g:?}"))?);
    }
    Ok(builder.build()?)
}
