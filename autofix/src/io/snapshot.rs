//! Point-in-time archives of the workspace, taken before any file is modified.
//!
//! Layout: `<root>/.autofix-snapshots/<id>.tar.gz`, one file per snapshot and
//! no manifest. Ids encode their UTC creation time, so lexical order is
//! chronological order.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::SnapshotError;
use crate::io::config::SnapshotConfig;
use crate::io::scanner::{is_pruned_dir, relative_path};

/// Directory (under the workspace root) holding snapshot archives.
pub const HISTORY_DIR_NAME: &str = ".autofix-snapshots";

const ID_PREFIX: &str = "snap-";
const ID_TIME_FORMAT: &str = "%Y%m%d-%H%M%S-%6f";
const ARCHIVE_SUFFIX: &str = ".tar.gz";
const PARTIAL_SUFFIX: &str = ".partial";

/// A durable snapshot archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
}

/// Creates, lists, restores and prunes snapshots for one workspace root.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    root: PathBuf,
    history_dir: PathBuf,
    exclude_dirs: Vec<String>,
}

impl SnapshotManager {
    pub fn new(root: &Path, config: &SnapshotConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            history_dir: root.join(HISTORY_DIR_NAME),
            exclude_dirs: config.exclude_dirs.clone(),
        }
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    /// Archive the workspace and make the archive durable before returning.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn create(&self) -> Result<Snapshot> {
        fs::create_dir_all(&self.history_dir)
            .with_context(|| format!("create history dir {}", self.history_dir.display()))?;
        let created_at = self.next_timestamp()?;
        let id = format_id(created_at);
        let archive_path = self.archive_path(&id);
        let partial_path = self
            .history_dir
            .join(format!("{id}{ARCHIVE_SUFFIX}{PARTIAL_SUFFIX}"));

        if let Err(err) = self.write_archive(&partial_path) {
            if let Err(cleanup_err) = fs::remove_file(&partial_path) {
                debug!(err = %cleanup_err, "no partial archive to remove");
            }
            return Err(err.context(format!("create snapshot {id}")));
        }
        fs::rename(&partial_path, &archive_path)
            .with_context(|| format!("finalize snapshot {}", archive_path.display()))?;
        sync_dir(&self.history_dir)?;

        let size_bytes = fs::metadata(&archive_path)
            .with_context(|| format!("stat {}", archive_path.display()))?
            .len();
        info!(id = %id, size_bytes, "snapshot created");
        Ok(Snapshot {
            id,
            created_at,
            archive_path,
            size_bytes,
        })
    }

    /// Snapshots, newest first. A missing history directory means none.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let entries = match fs::read_dir(&self.history_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read history dir {}", self.history_dir.display()));
            }
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.context("read history entry")?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(ARCHIVE_SUFFIX)) else {
                continue;
            };
            let Some(created_at) = parse_id(id) else {
                debug!(name = %id, "ignoring foreign file in history dir");
                continue;
            };
            let meta = entry
                .metadata()
                .with_context(|| format!("stat {}", entry.path().display()))?;
            if !meta.is_file() {
                continue;
            }
            snapshots.push(Snapshot {
                id: id.to_string(),
                created_at,
                archive_path: entry.path(),
                size_bytes: meta.len(),
            });
        }
        snapshots.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(snapshots)
    }

    /// Extract snapshot `id` into a fresh temporary directory and return it.
    ///
    /// The live tree is never touched; the caller owns the returned directory.
    #[instrument(skip(self))]
    pub fn restore(&self, id: &str) -> Result<PathBuf> {
        if parse_id(id).is_none() {
            return Err(SnapshotError::InvalidId(id.to_string()).into());
        }
        let archive_path = self.archive_path(id);
        if !archive_path.is_file() {
            return Err(SnapshotError::NotFound { id: id.to_string() }.into());
        }

        let dest = tempfile::Builder::new()
            .prefix(&format!("autofix-restore-{id}-"))
            .tempdir()
            .context("create restore dir")?
            .keep();
        if let Err(err) = unpack(&archive_path, &dest) {
            if let Err(cleanup_err) = fs::remove_dir_all(&dest) {
                warn!(err = %cleanup_err, dest = %dest.display(), "failed to remove restore dir");
            }
            return Err(err.context(format!("restore snapshot {id}")));
        }
        info!(dest = %dest.display(), "snapshot restored");
        Ok(dest)
    }

    /// Delete all but the `keep` newest snapshots and return the removed ids.
    pub fn cleanup(&self, keep: usize) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for snapshot in self.list()?.into_iter().skip(keep) {
            fs::remove_file(&snapshot.archive_path)
                .with_context(|| format!("remove {}", snapshot.archive_path.display()))?;
            debug!(id = %snapshot.id, "snapshot removed");
            removed.push(snapshot.id);
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), keep, "snapshot retention applied");
        }
        Ok(removed)
    }

    fn archive_path(&self, id: &str) -> PathBuf {
        self.history_dir.join(format!("{id}{ARCHIVE_SUFFIX}"))
    }

    /// Now, or one microsecond after the newest existing snapshot if the
    /// clock has not moved past it.
    fn next_timestamp(&self) -> Result<DateTime<Utc>> {
        let now = truncate_to_micros(Utc::now());
        let newest = self.list()?.into_iter().next().map(|s| s.created_at);
        Ok(match newest {
            Some(newest) if newest >= now => newest + TimeDelta::microseconds(1),
            _ => now,
        })
    }

    fn write_archive(&self, partial_path: &Path) -> Result<()> {
        let file = File::create(partial_path)
            .with_context(|| format!("create {}", partial_path.display()))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_pruned_dir(entry, &self.exclude_dirs));
        let mut files = 0usize;
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", self.root.display()))?;
            if entry.depth() == 0 {
                continue;
            }
            let rel = relative_path(&self.root, entry.path());
            if entry.file_type().is_dir() {
                builder
                    .append_dir(&rel, entry.path())
                    .with_context(|| format!("archive dir {rel}"))?;
            } else {
                builder
                    .append_path_with_name(entry.path(), &rel)
                    .with_context(|| format!("archive {rel}"))?;
                files += 1;
            }
        }

        let encoder = builder.into_inner().context("finish tar stream")?;
        let writer = encoder.finish().context("finish gzip stream")?;
        let file = writer
            .into_inner()
            .map_err(|err| err.into_error())
            .context("flush archive")?;
        file.sync_all()
            .with_context(|| format!("fsync {}", partial_path.display()))?;
        debug!(files, "archive written");
        Ok(())
    }
}

/// Snapshot `root` using `config`.
pub fn create_snapshot(root: &Path, config: &SnapshotConfig) -> Result<Snapshot> {
    SnapshotManager::new(root, config).create()
}

/// Snapshots recorded for `root`, newest first.
pub fn list_snapshots(root: &Path) -> Result<Vec<Snapshot>> {
    SnapshotManager::new(root, &SnapshotConfig::default()).list()
}

fn unpack(archive_path: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive_path).with_context(|| format!("open {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive
        .unpack(dest)
        .with_context(|| format!("unpack into {}", dest.display()))
}

fn format_id(created_at: DateTime<Utc>) -> String {
    format!("{ID_PREFIX}{}", created_at.format(ID_TIME_FORMAT))
}

fn parse_id(id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.strip_prefix(ID_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, ID_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .filter(|parsed| format_id(*parsed) == id)
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .with_context(|| format!("fsync {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/lib.rs"), "pub fn lib() {}\n").expect("write");
        fs::create_dir_all(temp.path().join("target/debug")).expect("mkdir");
        fs::write(temp.path().join("target/debug/out"), "bin").expect("write");
        temp
    }

    #[test]
    fn ids_round_trip_and_reject_garbage() {
        let ts = truncate_to_micros(Utc::now());
        let id = format_id(ts);
        assert!(id.starts_with("snap-"));
        assert_eq!(parse_id(&id), Some(ts));
        for bad in ["snap-", "snap-2024", "../etc/passwd", "snap-20240101-000000-1"] {
            assert_eq!(parse_id(bad), None, "{bad}");
        }
    }

    #[test]
    fn create_writes_archive_and_skips_excluded_dirs() {
        let temp = workspace();
        let manager = SnapshotManager::new(temp.path(), &SnapshotConfig::default());
        let snapshot = manager.create().expect("create");
        assert!(snapshot.archive_path.is_file());
        assert!(snapshot.size_bytes > 0);

        let restored = manager.restore(&snapshot.id).expect("restore");
        assert_eq!(
            fs::read_to_string(restored.join("src/lib.rs")).expect("read"),
            "pub fn lib() {}\n"
        );
        assert!(!restored.join("target").exists());
        assert!(!restored.join(HISTORY_DIR_NAME).exists());
        fs::remove_dir_all(restored).expect("cleanup");
    }

    #[test]
    fn consecutive_ids_are_strictly_increasing() {
        let temp = workspace();
        let manager = SnapshotManager::new(temp.path(), &SnapshotConfig::default());
        let first = manager.create().expect("first");
        let second = manager.create().expect("second");
        assert!(second.id > first.id);
        let listed: Vec<String> = manager.list().expect("list").into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![second.id, first.id]);
    }

    #[test]
    fn list_ignores_partial_and_foreign_files() {
        let temp = workspace();
        let manager = SnapshotManager::new(temp.path(), &SnapshotConfig::default());
        assert!(manager.list().expect("empty list").is_empty());

        let snapshot = manager.create().expect("create");
        let history = manager.history_dir();
        fs::write(history.join("notes.txt"), "x").expect("write");
        fs::write(history.join("snap-bogus.tar.gz"), "x").expect("write");
        fs::write(
            history.join(format!("{}.tar.gz.partial", format_id(Utc::now()))),
            "x",
        )
        .expect("write");
        let ids: Vec<String> = manager.list().expect("list").into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![snapshot.id]);
    }

    #[test]
    fn restore_unknown_or_invalid_id_fails() {
        let temp = workspace();
        let manager = SnapshotManager::new(temp.path(), &SnapshotConfig::default());
        let err = manager
            .restore("snap-20200101-000000-000000")
            .expect_err("missing");
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::NotFound { .. })
        ));
        let err = manager.restore("../escape").expect_err("invalid");
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::InvalidId(_))
        ));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let temp = workspace();
        let manager = SnapshotManager::new(temp.path(), &SnapshotConfig::default());
        for _ in 0..3 {
            manager.create().expect("create");
        }
        assert_eq!(manager.cleanup(1).expect("cleanup").len(), 2);
        assert!(manager.cleanup(1).expect("cleanup again").is_empty());
        assert_eq!(manager.list().expect("list").len(), 1);
    }
}
