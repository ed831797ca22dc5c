//! Error report directory
//!
//! Manages report files in `~/.local/share/crashgate/error/`:
//!
//! ```text
//! <root>/
//!   {id}.json        managed error log
//!   {id}.throwable   raw failure (optional)
//!   {id}.enqueued    handed to the channel, waiting for an outcome
//!   minidump/new/{session}/<artifact>
//!   minidump/pending/{id}/<artifact>
//! ```
//!
//! Only files whose stem parses as a [`ReportId`] belong to this store;
//! anything else in the root is left alone.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crashgate_core::codec;
use crashgate_core::domain::{ErrorReport, Failure, ManagedErrorLog, ReportId};

use crate::error::{Result, StorageError};

pub const ERROR_LOG_EXTENSION: &str = "json";
pub const RAW_FAILURE_EXTENSION: &str = "throwable";
pub const ENQUEUED_MARKER_EXTENSION: &str = "enqueued";
const TMP_EXTENSION: &str = "tmp";

const MINIDUMP_DIRECTORY: &str = "minidump";
const NEW_MINIDUMP_DIRECTORY: &str = "new";
const PENDING_MINIDUMP_DIRECTORY: &str = "pending";

/// A managed log found on disk, with its marker state
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub log: ManagedErrorLog,
    /// `{id}.enqueued` exists: the log already went to the channel
    pub enqueued: bool,
    /// `{id}.throwable` exists
    pub has_raw: bool,
    pub size_bytes: u64,
}

/// Manages the directory of persisted error reports and minidumps.
#[derive(Debug)]
pub struct ErrorStorage {
    root: PathBuf,
    session_minidump_dir: OnceLock<PathBuf>,
}

impl ErrorStorage {
    /// Creates a store rooted at `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            session_minidump_dir: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root and `minidump/new`.
    ///
    /// `minidump/pending` is created on demand when a minidump is moved.
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.new_minidumps_root())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    pub fn log_path(&self, id: &ReportId) -> PathBuf {
        self.file_path(id, ERROR_LOG_EXTENSION)
    }

    pub fn raw_path(&self, id: &ReportId) -> PathBuf {
        self.file_path(id, RAW_FAILURE_EXTENSION)
    }

    pub fn enqueued_marker_path(&self, id: &ReportId) -> PathBuf {
        self.file_path(id, ENQUEUED_MARKER_EXTENSION)
    }

    fn file_path(&self, id: &ReportId, extension: &str) -> PathBuf {
        self.root.join(format!("{id}.{extension}"))
    }

    fn new_minidumps_root(&self) -> PathBuf {
        self.root.join(MINIDUMP_DIRECTORY).join(NEW_MINIDUMP_DIRECTORY)
    }

    /// Fixed directory holding minidumps associated with a report.
    pub fn pending_minidump_directory(&self) -> PathBuf {
        self.root
            .join(MINIDUMP_DIRECTORY)
            .join(PENDING_MINIDUMP_DIRECTORY)
    }

    /// Directory the native capturer of this process writes into.
    ///
    /// Fresh and unique per `ErrorStorage` instance; created on first call.
    pub fn new_minidump_directory(&self) -> Result<PathBuf> {
        let dir = self
            .session_minidump_dir
            .get_or_init(|| self.new_minidumps_root().join(Uuid::new_v4().to_string()));
        fs::create_dir_all(dir)?;
        Ok(dir.clone())
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// Atomically writes `{id}.json`.
    pub fn save_error_log(&self, log: &ManagedErrorLog) -> Result<PathBuf> {
        let path = self.log_path(&log.id);
        fs::create_dir_all(&self.root)?;
        write_atomic(&path, &codec::encode_log(log)?)?;
        debug!(report_id = %log.id, path = %path.display(), "Saved error log");
        Ok(path)
    }

    /// Atomically writes `{id}.throwable`.
    pub fn save_raw_failure(&self, id: &ReportId, failure: &Failure) -> Result<()> {
        write_atomic(&self.raw_path(id), &codec::encode_raw(failure)?)?;
        Ok(())
    }

    /// Persists a report: the managed log must succeed, the raw form is
    /// best-effort.
    pub fn save_report(&self, log: &ManagedErrorLog, failure: &Failure) -> Result<PathBuf> {
        let path = self.save_error_log(log)?;
        if let Err(e) = self.save_raw_failure(&log.id, failure) {
            warn!(report_id = %log.id, error = %e, "Failed to save raw failure");
            remove_if_exists(&self.raw_path(&log.id));
        }
        Ok(path)
    }

    /// Reads `{id}.json`; `Ok(None)` when it does not exist.
    pub fn read_error_log(&self, id: &ReportId) -> Result<Option<ManagedErrorLog>> {
        let path = self.log_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(codec::decode_log(&bytes)?))
    }

    /// Reads `{id}.throwable`; `None` when absent or unreadable.
    pub fn read_raw_failure(&self, id: &ReportId) -> Option<Failure> {
        let bytes = fs::read(self.raw_path(id)).ok()?;
        codec::decode_raw(&bytes)
    }

    /// Rebuilds the application-facing report from disk.
    pub fn read_report(&self, id: &ReportId) -> Option<ErrorReport> {
        let log_bytes = fs::read(self.log_path(id)).ok()?;
        let raw_bytes = fs::read(self.raw_path(id)).ok();
        codec::decode(&log_bytes, raw_bytes.as_deref())
    }

    /// Lists stored reports, oldest capture first.
    ///
    /// Logs that cannot be parsed, or whose content does not match their
    /// file name, are deleted together with their sibling files.
    pub fn list_stored_reports(&self) -> Result<Vec<StoredReport>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || !has_extension(&path, ERROR_LOG_EXTENSION) {
                continue;
            }
            let Some(id) = report_id_of(&path) else {
                continue;
            };

            let parsed = fs::read(&path)
                .map_err(StorageError::from)
                .and_then(|bytes| codec::decode_log(&bytes).map_err(StorageError::from));
            match parsed {
                Ok(log) if log.id == id => {
                    let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or_default();
                    reports.push(StoredReport {
                        enqueued: self.is_enqueued(&id),
                        has_raw: self.raw_path(&id).exists(),
                        size_bytes,
                        log,
                    });
                }
                Ok(log) => {
                    warn!(report_id = %id, content_id = %log.id, "Deleting mismatched error log");
                    self.delete_report(&id);
                }
                Err(e) => {
                    warn!(report_id = %id, error = %e, "Deleting invalid error log");
                    self.delete_report(&id);
                }
            }
        }

        reports.sort_by(|a, b| a.log.id.cmp(&b.log.id));
        Ok(reports)
    }

    /// Writes the `{id}.enqueued` marker.
    pub fn mark_enqueued(&self, id: &ReportId) -> Result<()> {
        write_atomic(&self.enqueued_marker_path(id), b"")?;
        Ok(())
    }

    pub fn is_enqueued(&self, id: &ReportId) -> bool {
        self.enqueued_marker_path(id).exists()
    }

    /// Makes the report processable again after a refused hand-off.
    pub fn clear_enqueued(&self, id: &ReportId) {
        remove_if_exists(&self.enqueued_marker_path(id));
    }

    /// Removes every file of a report. Best-effort: failures are logged.
    ///
    /// The managed log goes first so a partial delete never leaves a report
    /// that looks processable.
    pub fn delete_report(&self, id: &ReportId) {
        remove_if_exists(&self.log_path(id));
        remove_if_exists(&self.raw_path(id));
        remove_if_exists(&self.enqueued_marker_path(id));
        remove_if_exists(&self.file_tmp_path(id, ERROR_LOG_EXTENSION));
        self.delete_pending_minidump(id);
        debug!(report_id = %id, "Deleted report files");
    }

    /// Deletes every local artifact: reports, pending and new minidumps.
    ///
    /// The minidump directory of the current session is emptied but kept.
    /// Returns the number of reports removed.
    pub fn delete_all(&self) -> usize {
        let mut ids: Vec<ReportId> = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    if let Some(id) = report_id_of(&path) {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
            }
        }
        for id in &ids {
            self.delete_report(id);
        }

        remove_dir_if_exists(&self.pending_minidump_directory());
        if let Ok(entries) = fs::read_dir(self.new_minidumps_root()) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    remove_dir_if_exists(&path);
                } else {
                    remove_if_exists(&path);
                }
            }
        }
        if let Some(dir) = self.session_minidump_dir.get() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!(path = %dir.display(), error = %e, "Failed to recreate minidump directory");
            }
        }
        ids.len()
    }

    /// Deletes leftovers no complete report owns.
    ///
    /// Removes `*.tmp` files, `.throwable`/`.enqueued` files without a log,
    /// and pending minidump folders without a log. Returns how many were
    /// deleted.
    pub fn delete_orphans(&self) -> usize {
        let mut deleted = 0;

        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let orphan = if has_extension(&path, TMP_EXTENSION) {
                    true
                } else if has_extension(&path, RAW_FAILURE_EXTENSION)
                    || has_extension(&path, ENQUEUED_MARKER_EXTENSION)
                {
                    report_id_of(&path).is_some_and(|id| !self.log_path(&id).exists())
                } else {
                    false
                };
                if orphan {
                    remove_if_exists(&path);
                    deleted += 1;
                }
            }
        }

        if let Ok(entries) = fs::read_dir(self.pending_minidump_directory()) {
            for entry in entries.flatten() {
                let path = entry.path();
                let owned = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.parse::<ReportId>().ok())
                    .is_some_and(|id| self.log_path(&id).exists());
                if !owned {
                    if path.is_dir() {
                        remove_dir_if_exists(&path);
                    } else {
                        remove_if_exists(&path);
                    }
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            debug!(count = deleted, "Deleted orphaned report files");
        }
        deleted
    }

    fn file_tmp_path(&self, id: &ReportId, extension: &str) -> PathBuf {
        tmp_path(&self.file_path(id, extension))
    }

    // ------------------------------------------------------------------
    // Minidumps
    // ------------------------------------------------------------------

    /// Minidumps left by previous sessions, in path order.
    ///
    /// The current session's directory is skipped.
    pub fn list_new_minidumps(&self) -> Result<Vec<PathBuf>> {
        let root = self.new_minidumps_root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let current = self.session_minidump_dir.get();
        let mut dumps = Vec::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.is_file() {
                dumps.push(path);
            } else if path.is_dir() && Some(&path) != current {
                for inner in fs::read_dir(&path)? {
                    let inner = inner?.path();
                    if inner.is_file() {
                        dumps.push(inner);
                    }
                }
            }
        }
        dumps.sort();
        Ok(dumps)
    }

    /// Removes session folders of previous sessions that are now empty.
    pub fn prune_minidump_sessions(&self) {
        let current = self.session_minidump_dir.get();
        if let Ok(entries) = fs::read_dir(self.new_minidumps_root()) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && Some(&path) != current {
                    // Fails while the folder still holds files, which is fine
                    let _ = fs::remove_dir(&path);
                }
            }
        }
    }

    /// Moves a minidump to `pending/{id}/<file name>`.
    ///
    /// On error the minidump may still be at its original location; callers
    /// delete it.
    pub fn move_minidump_to_pending(&self, dump: &Path, id: &ReportId) -> Result<PathBuf> {
        let file_name = dump.file_name().ok_or_else(|| StorageError::MinidumpMove {
            path: dump.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
        })?;
        let target_dir = self.pending_minidump_directory().join(id.to_string());
        let target = target_dir.join(file_name);

        fs::create_dir_all(&target_dir)
            .and_then(|_| fs::rename(dump, &target))
            .map_err(|source| StorageError::MinidumpMove {
                path: dump.to_path_buf(),
                source,
            })?;
        debug!(report_id = %id, path = %target.display(), "Moved minidump to pending");
        Ok(target)
    }

    /// Returns the minidump associated with a report, if any.
    pub fn pending_minidump(&self, id: &ReportId) -> Option<PathBuf> {
        let dir = self.pending_minidump_directory().join(id.to_string());
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files.into_iter().next()
    }

    /// Removes `pending/{id}` and its content.
    pub fn delete_pending_minidump(&self, id: &ReportId) {
        remove_dir_if_exists(&self.pending_minidump_directory().join(id.to_string()));
    }

    /// Last modification time of a file, used as the native crash time.
    pub fn modified_at(path: &Path) -> DateTime<Utc> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now())
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(TMP_EXTENSION);
    PathBuf::from(name)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}

/// Report id encoded in a file name (`{id}.json`, `{id}.json.tmp`, ...).
fn report_id_of(path: &Path) -> Option<ReportId> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    stem.parse().ok()
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to delete file");
        }
    }
}

fn remove_dir_if_exists(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to delete directory");
        }
    }
}
