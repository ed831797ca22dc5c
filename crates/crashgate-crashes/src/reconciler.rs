//! Session reconciliation
//!
//! Runs once per pipeline, on the worker, before any report is exposed:
//!
//! 1. lists stored reports (invalid logs are deleted by the listing);
//! 2. associates every minidump left in `minidump/new` by a previous
//!    session with a fresh report id by moving it to `minidump/pending/{id}`,
//!    deleting the dump when the move fails;
//! 3. synthesizes and persists a native report for each associated dump;
//! 4. deletes orphaned files and empty session folders;
//! 5. picks the most recent not-yet-enqueued report as the last session's
//!    crash.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crashgate_core::codec::{self, CaptureContext};
use crashgate_core::domain::{ErrorReport, Failure, ReportId};
use crashgate_storage::{ErrorStorage, StoredReport};

/// What reconciliation found
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Crash of the previous session, if any
    pub last_session_crash: Option<ErrorReport>,
    /// Reports on disk after reconciliation, oldest first
    pub reports: Vec<StoredReport>,
    /// Native reports synthesized from minidumps
    pub native_reports: usize,
    /// Minidumps deleted because they could not be associated
    pub dropped_minidumps: usize,
    /// Orphaned files deleted
    pub orphans: usize,
}

pub struct SessionReconciler<'a> {
    storage: &'a ErrorStorage,
    context: &'a CaptureContext,
}

impl<'a> SessionReconciler<'a> {
    pub fn new(storage: &'a ErrorStorage, context: &'a CaptureContext) -> Self {
        Self { storage, context }
    }

    pub fn reconcile(&self) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            reports: self.storage.list_stored_reports().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to list stored reports");
                Vec::new()
            }),
            ..ReconcileOutcome::default()
        };

        let dumps = self.storage.list_new_minidumps().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list new minidumps");
            Vec::new()
        });
        for dump in dumps {
            match self.associate_minidump(&dump) {
                Some(report) => {
                    outcome.native_reports += 1;
                    outcome.reports.push(report);
                }
                None => outcome.dropped_minidumps += 1,
            }
        }

        self.storage.prune_minidump_sessions();
        outcome.orphans = self.storage.delete_orphans();
        outcome.reports.sort_by(|a, b| a.log.id.cmp(&b.log.id));

        outcome.last_session_crash = outcome
            .reports
            .iter()
            .rev()
            .find(|stored| !stored.enqueued)
            .and_then(|stored| self.storage.read_report(&stored.log.id));

        info!(
            reports = outcome.reports.len(),
            native = outcome.native_reports,
            dropped_minidumps = outcome.dropped_minidumps,
            orphans = outcome.orphans,
            crashed_last_session = outcome.last_session_crash.is_some(),
            "Session reconciled"
        );
        outcome
    }

    /// Moves a minidump into `pending` and persists its native report.
    ///
    /// Fails closed: on any error the dump and every file written for it are
    /// deleted.
    fn associate_minidump(&self, dump: &Path) -> Option<StoredReport> {
        let id = ReportId::new();
        let crashed_at = ErrorStorage::modified_at(dump);

        if let Err(e) = self.storage.move_minidump_to_pending(dump, &id) {
            warn!(path = %dump.display(), error = %e, "Discarding minidump that could not be moved");
            if let Err(e) = fs::remove_file(dump) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %dump.display(), error = %e, "Failed to delete minidump");
                }
            }
            self.storage.delete_pending_minidump(&id);
            return None;
        }

        let log = codec::encode_native(id, crashed_at, self.context);
        match self.storage.save_report(&log, &Failure::native()) {
            Ok(path) => Some(StoredReport {
                size_bytes: fs::metadata(path).map(|m| m.len()).unwrap_or_default(),
                log,
                enqueued: false,
                has_raw: self.storage.raw_path(&id).exists(),
            }),
            Err(e) => {
                warn!(report_id = %id, error = %e, "Failed to persist native report");
                self.storage.delete_report(&id);
                None
            }
        }
    }
}
