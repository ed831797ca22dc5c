//! Confirmation gate
//!
//! Decides, per report, whether it may proceed to delivery:
//!
//! ```text
//! Captured → AwaitingProcessDecision ─┬─ should_process == false ──→ Discarded
//!                                     ├─ always send / no prompt ──→ Approved
//!                                     └─ prompt ─→ AwaitingUserConfirmation
//!                                                    ├─ Send / AlwaysSend → Approved
//!                                                    └─ DontSend ─────────→ Discarded
//! ```
//!
//! Reports waiting for the user are held here until a decision arrives.
//! Nothing is persisted about the wait itself: after a restart the same
//! reports are still on disk without an enqueued marker and go through the
//! gate again.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crashgate_core::domain::{ErrorReport, ManagedErrorLog, ReportId, ReportState, UserConfirmation};
use crashgate_core::ports::{CrashesListener, IFlagStore, ALWAYS_SEND_KEY};

use crate::guarded::call_listener;
use crate::tracker::ReportTracker;

/// A report and its managed log, moving through the gate
#[derive(Debug, Clone)]
pub struct Candidate {
    pub report: ErrorReport,
    pub log: ManagedErrorLog,
}

impl Candidate {
    pub fn id(&self) -> ReportId {
        *self.report.id()
    }
}

pub struct ConfirmationGate {
    tracker: ReportTracker,
    listener: Arc<dyn CrashesListener>,
    flag_store: Arc<dyn IFlagStore>,
    always_send: bool,
    awaiting: Vec<Candidate>,
}

impl ConfirmationGate {
    pub fn new(
        tracker: ReportTracker,
        listener: Arc<dyn CrashesListener>,
        flag_store: Arc<dyn IFlagStore>,
    ) -> Self {
        let always_send = flag_store.get_bool(ALWAYS_SEND_KEY);
        Self {
            tracker,
            listener,
            flag_store,
            always_send,
            awaiting: Vec::new(),
        }
    }

    /// Whether "always send" has been chosen, in this or an earlier process
    pub fn always_send(&self) -> bool {
        self.always_send
    }

    /// Number of reports waiting for a user decision
    pub fn awaiting_len(&self) -> usize {
        self.awaiting.len()
    }

    /// Runs a batch through the process decision and the confirmation prompt.
    ///
    /// Returns the approved candidates. Rejected ones are deleted; ones that
    /// need the user are held until [`resolve`](Self::resolve).
    pub fn admit(&mut self, batch: Vec<Candidate>) -> Vec<Candidate> {
        let mut accepted = Vec::new();
        for candidate in batch {
            let id = candidate.id();
            self.tracker.track(id);
            if let Err(e) = self
                .tracker
                .advance(&id, ReportState::AwaitingProcessDecision)
            {
                error!(report_id = %id, error = %e, "Discarding report");
                self.tracker.discard(&id);
                continue;
            }

            let listener = Arc::clone(&self.listener);
            match call_listener("should_process", || listener.should_process(&candidate.report)) {
                Ok(true) => accepted.push(candidate),
                Ok(false) => {
                    debug!(report_id = %id, "Listener declined report");
                    self.tracker.discard(&id);
                }
                Err(e) => {
                    error!(report_id = %id, error = %e, "Discarding report");
                    self.tracker.discard(&id);
                }
            }
        }

        if accepted.is_empty() {
            return accepted;
        }
        if self.always_send {
            return self.approve_all(accepted);
        }

        let listener = Arc::clone(&self.listener);
        match call_listener("should_await_user_confirmation", || {
            listener.should_await_user_confirmation()
        }) {
            Ok(false) => self.approve_all(accepted),
            Ok(true) => {
                for candidate in accepted {
                    let id = candidate.id();
                    match self
                        .tracker
                        .advance(&id, ReportState::AwaitingUserConfirmation)
                    {
                        Ok(()) => self.awaiting.push(candidate),
                        Err(e) => {
                            error!(report_id = %id, error = %e, "Discarding report");
                            self.tracker.discard(&id);
                        }
                    }
                }
                info!(count = self.awaiting.len(), "Waiting for user confirmation");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "Discarding batch");
                for candidate in accepted {
                    self.tracker.discard(&candidate.id());
                }
                Vec::new()
            }
        }
    }

    /// Applies a user decision to every waiting report.
    ///
    /// `AlwaysSend` is also persisted, so later reports of this and future
    /// processes skip the prompt.
    pub fn resolve(&mut self, decision: UserConfirmation) -> Vec<Candidate> {
        if decision == UserConfirmation::AlwaysSend {
            self.always_send = true;
            if let Err(e) = self.flag_store.put_bool(ALWAYS_SEND_KEY, true) {
                warn!(error = %e, "Failed to persist always-send choice");
            }
        }

        let waiting = std::mem::take(&mut self.awaiting);
        info!(decision = %decision, count = waiting.len(), "User confirmation received");
        if decision.approves() {
            self.approve_all(waiting)
        } else {
            for candidate in waiting {
                self.tracker.discard(&candidate.id());
            }
            Vec::new()
        }
    }

    /// Drops every waiting report as if the user declined.
    pub fn cancel(&mut self) -> usize {
        let waiting = std::mem::take(&mut self.awaiting);
        for candidate in &waiting {
            self.tracker.discard(&candidate.id());
        }
        waiting.len()
    }

    fn approve_all(&mut self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|candidate| {
                let id = candidate.id();
                match self.tracker.advance(&id, ReportState::Approved) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(report_id = %id, error = %e, "Discarding report");
                        self.tracker.discard(&id);
                        false
                    }
                }
            })
            .collect()
    }
}
