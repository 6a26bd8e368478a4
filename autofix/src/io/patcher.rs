//! Writing patched content back to the workspace.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::core::patch::apply_patch;

/// Apply `patch_text` to `original` and atomically replace `path` with the result.
///
/// The patch is applied in memory first; a format error or conflict returns
/// before anything is written, so the target stays unchanged.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn apply_to_file(path: &Path, original: &str, patch_text: &str) -> Result<String> {
    let patched = apply_patch(original, patch_text)?;
    write_atomic(path, &patched)?;
    debug!(bytes = patched.len(), "patched file written");
    Ok(patched)
}

/// Replace `path` with `contents` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("fsync temp file for {}", path.display()))?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())
            .with_context(|| format!("copy permissions of {}", path.display()))?;
    }
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
