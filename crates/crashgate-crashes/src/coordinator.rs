//! Delivery coordinator
//!
//! Hands approved reports to the delivery channel and reacts to the
//! channel's per-log outcome:
//!
//! - the managed log goes first, with the priority derived from its flags;
//! - the minidump attachment (if any) and valid listener attachments
//!   follow with default priority;
//! - success or a permanent failure of the managed log deletes every local
//!   file of the report; a transient failure keeps them.
//!
//! The enqueued marker is written before the log is handed over, so a
//! report is never sent twice across restarts. A report whose marker cannot
//! be written stays unprocessed for the next start.
//!
//! Outcomes may arrive in a later process than the one that enqueued the
//! log. The report is then rebuilt from its files, which are only deleted
//! once the outcome is known.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crashgate_core::domain::{
    ErrorAttachmentLog, ErrorReport, Flags, Log, ReportId, ReportState,
    CONTENT_TYPE_OCTET_STREAM,
};
use crashgate_core::ports::{CrashesListener, DeliveryError, IDeliveryChannel};
use crashgate_storage::ErrorStorage;

use crate::gate::Candidate;
use crate::guarded::call_listener;
use crate::tracker::ReportTracker;

pub struct DeliveryCoordinator {
    channel: Arc<dyn IDeliveryChannel>,
    storage: Arc<ErrorStorage>,
    listener: Arc<dyn CrashesListener>,
    tracker: ReportTracker,
    group_name: String,
    in_flight: HashMap<ReportId, ErrorReport>,
}

impl DeliveryCoordinator {
    pub fn new(
        channel: Arc<dyn IDeliveryChannel>,
        storage: Arc<ErrorStorage>,
        listener: Arc<dyn CrashesListener>,
        tracker: ReportTracker,
        group_name: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            storage,
            listener,
            tracker,
            group_name: group_name.into(),
            in_flight: HashMap::new(),
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Reports enqueued by this process still waiting for an outcome
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Enqueues an approved report and its attachments.
    pub fn deliver(&mut self, candidate: Candidate) {
        let id = candidate.id();
        let Candidate { report, log } = candidate;

        let listener = Arc::clone(&self.listener);
        let attachments = match call_listener("get_error_attachments", || {
            listener.get_error_attachments(&report)
        }) {
            Ok(attachments) => attachments,
            Err(e) => {
                error!(report_id = %id, error = %e, "Discarding report");
                self.tracker.discard(&id);
                return;
            }
        };

        if let Err(e) = self.storage.mark_enqueued(&id) {
            warn!(report_id = %id, error = %e, "Failed to write enqueued marker, keeping report");
            self.tracker.forget(&id);
            return;
        }

        let priority = log.flags.persistence_priority(true);
        if !self
            .channel
            .enqueue(Log::ManagedError(Box::new(log)), &self.group_name, priority)
        {
            warn!(report_id = %id, "Channel rejected error log, keeping report for next start");
            self.storage.clear_enqueued(&id);
            self.tracker.forget(&id);
            return;
        }

        if let Err(e) = self.tracker.advance(&id, ReportState::Enqueued) {
            warn!(report_id = %id, error = %e, "Unexpected state after enqueue");
        }
        self.in_flight.insert(id, report);
        info!(report_id = %id, priority = %priority, "Error log enqueued");

        self.enqueue_minidump(&id);
        for attachment in attachments {
            let attachment = attachment.with_error_id(id);
            if attachment.is_valid() {
                self.enqueue_attachment(attachment);
            } else {
                warn!(
                    report_id = %id,
                    file_name = ?attachment.file_name,
                    "Skipping invalid error attachment"
                );
            }
        }
    }

    /// Sends the report's minidump, then removes it from `pending`.
    fn enqueue_minidump(&self, id: &ReportId) {
        let Some(path) = self.storage.pending_minidump(id) else {
            return;
        };
        match fs::read(&path) {
            Ok(data) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "minidump.dmp".to_string());
                let attachment = ErrorAttachmentLog::attachment_with_binary(
                    data,
                    file_name,
                    CONTENT_TYPE_OCTET_STREAM,
                )
                .with_error_id(*id);
                self.enqueue_attachment(attachment);
            }
            Err(e) => warn!(report_id = %id, error = %e, "Failed to read minidump"),
        }
        self.storage.delete_pending_minidump(id);
    }

    fn enqueue_attachment(&self, attachment: ErrorAttachmentLog) {
        let report_id = attachment.error_id;
        if !self
            .channel
            .enqueue(Log::Attachment(attachment), &self.group_name, Flags::DEFAULTS)
        {
            warn!(report_id = ?report_id, "Channel rejected error attachment");
        }
    }

    // ------------------------------------------------------------------
    // Channel outcomes
    // ------------------------------------------------------------------

    pub fn on_before_sending(&self, log: &Log) {
        let Some(id) = managed_id(log) else { return };
        let Some(report) = self.report_for(&id) else {
            debug!(report_id = %id, "Before-sending for unknown report");
            return;
        };
        let listener = Arc::clone(&self.listener);
        if let Err(e) = call_listener("on_before_sending", || listener.on_before_sending(&report)) {
            error!(report_id = %id, error = %e, "Listener failed");
        }
    }

    pub fn on_success(&mut self, log: &Log) {
        let Some(id) = managed_id(log) else { return };
        let listener = Arc::clone(&self.listener);
        self.finish(&id, ReportState::Sent, "on_sending_succeeded", |report| {
            listener.on_sending_succeeded(report)
        });
    }

    pub fn on_failure(&mut self, log: &Log, failure: &DeliveryError) {
        let Some(id) = managed_id(log) else { return };
        if !failure.is_permanent() {
            debug!(report_id = %id, error = %failure, "Transient delivery failure, keeping files");
            return;
        }
        let listener = Arc::clone(&self.listener);
        self.finish(&id, ReportState::Failed, "on_sending_failed", |report| {
            listener.on_sending_failed(report, failure)
        });
    }

    /// Reports the definitive outcome, then deletes the report's files.
    fn finish(
        &mut self,
        id: &ReportId,
        target: ReportState,
        callback: &'static str,
        notify: impl FnOnce(&ErrorReport),
    ) {
        let report = self
            .in_flight
            .remove(id)
            .or_else(|| self.storage.read_report(id));

        if self.tracker.contains(id) {
            if let Err(e) = self.tracker.advance(id, target) {
                warn!(report_id = %id, error = %e, "Unexpected delivery outcome");
            }
        }

        match report {
            Some(report) => {
                if let Err(e) = call_listener(callback, || notify(&report)) {
                    error!(report_id = %id, error = %e, "Listener failed");
                }
            }
            None => debug!(report_id = %id, "Outcome for unknown report"),
        }

        self.storage.delete_report(id);
        info!(report_id = %id, outcome = %target, "Delivery finished");
    }

    fn report_for(&self, id: &ReportId) -> Option<ErrorReport> {
        self.in_flight
            .get(id)
            .cloned()
            .or_else(|| self.storage.read_report(id))
    }
}

fn managed_id(log: &Log) -> Option<ReportId> {
    log.as_managed_error().map(|managed| managed.id)
}
