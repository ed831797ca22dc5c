//! Pipeline worker
//!
//! Every state transition and every piece of report I/O outside the panic
//! hook happens here, one command at a time, on a dedicated thread.
//!
//! ```text
//! ┌──────────────────┐   Command    ┌──────────────────┐
//! │ CrashPipeline    │ ───────────► │ crashgate-worker │
//! │ channel callback │              │     thread       │
//! └──────────────────┘              └──────────────────┘
//!         ▲          Result via oneshot     │
//!         └─────────────────────────────────┤
//!                                           ▼
//!                        reconciler → gate → coordinator → storage
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crashgate_core::codec::CaptureContext;
use crashgate_core::domain::{ErrorReport, Log, UserConfirmation};
use crashgate_core::ports::{DeliveryError, IDeliveryChannel, IFlagStore, CLEANUP_PENDING_KEY};
use crashgate_storage::ErrorStorage;

use crate::capture::suppress_capture_on_current_thread;
use crate::coordinator::DeliveryCoordinator;
use crate::error::Result;
use crate::gate::{Candidate, ConfirmationGate};
use crate::reconciler::SessionReconciler;
use crate::tracker::ReportTracker;

pub const WORKER_THREAD_NAME: &str = "crashgate-worker";

/// Whether the caller runs on the pipeline worker (inside a listener callback)
pub fn on_worker_thread() -> bool {
    std::thread::current().name() == Some(WORKER_THREAD_NAME)
}

/// Reconciliation results the worker publishes for readers on any thread,
/// including listener callbacks running on the worker itself
#[derive(Debug, Default)]
pub struct SessionView {
    last_session_crash: Mutex<Option<ErrorReport>>,
}

impl SessionView {
    pub fn last_session_crash(&self) -> Option<ErrorReport> {
        self.last_session_crash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_crashed(&self) -> bool {
        self.last_session_crash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set_last_session_crash(&self, report: Option<ErrorReport>) {
        *self
            .last_session_crash
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = report;
    }
}

/// What [`disable`](crate::CrashPipeline::disable) removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisableSummary {
    /// Reports that were awaiting user confirmation; their files are deleted
    pub cancelled: usize,
    /// Other reports still on disk, removed by the final sweep
    pub swept: usize,
}

impl DisableSummary {
    /// Every report deleted by disabling
    pub fn total(&self) -> usize {
        self.cancelled + self.swept
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Outcome callbacks forwarded from the delivery channel
#[derive(Debug)]
pub enum DeliveryEvent {
    BeforeSending(Log),
    Success(Log),
    Failure(Log, DeliveryError),
}

/// Work items processed by the worker, in order of arrival
#[derive(Debug)]
pub enum Command {
    /// Reconcile stored reports and minidumps with this session
    Reconcile,

    /// Run every not-yet-processed report through the gate
    Start,

    LastSessionCrashReport {
        reply: oneshot::Sender<Result<Option<ErrorReport>>>,
    },

    HasCrashedInLastSession {
        reply: oneshot::Sender<Result<bool>>,
    },

    MinidumpDirectory {
        reply: oneshot::Sender<Result<PathBuf>>,
    },

    NotifyUserConfirmation {
        decision: UserConfirmation,
        reply: oneshot::Sender<Result<()>>,
    },

    Delivery(DeliveryEvent),

    /// Resolves once every earlier command has been processed
    Flush { reply: oneshot::Sender<Result<()>> },

    /// Cancel, sweep every local artifact, unregister and stop
    Disable {
        reply: oneshot::Sender<Result<DisableSummary>>,
    },

    /// Stop without touching stored reports
    Shutdown,
}

// ============================================================================
// Worker
// ============================================================================

pub struct Worker {
    rx: mpsc::UnboundedReceiver<Command>,
    storage: Arc<ErrorStorage>,
    context: CaptureContext,
    tracker: ReportTracker,
    flag_store: Arc<dyn IFlagStore>,
    channel: Arc<dyn IDeliveryChannel>,
    gate: ConfirmationGate,
    coordinator: DeliveryCoordinator,
    session: Arc<SessionView>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: mpsc::UnboundedReceiver<Command>,
        storage: Arc<ErrorStorage>,
        context: CaptureContext,
        tracker: ReportTracker,
        flag_store: Arc<dyn IFlagStore>,
        channel: Arc<dyn IDeliveryChannel>,
        gate: ConfirmationGate,
        coordinator: DeliveryCoordinator,
        session: Arc<SessionView>,
    ) -> Self {
        Self {
            rx,
            storage,
            context,
            tracker,
            flag_store,
            channel,
            gate,
            coordinator,
            session,
        }
    }

    /// Runs until disabled, shut down, or every sender is dropped.
    pub fn run(mut self) {
        suppress_capture_on_current_thread();
        info!("Crash pipeline worker started");

        while let Some(command) = self.rx.blocking_recv() {
            if !self.process_command(command) {
                break;
            }
        }

        info!("Crash pipeline worker stopped");
    }

    /// Processes one command; returns false when the worker must stop.
    fn process_command(&mut self, command: Command) -> bool {
        match command {
            Command::Reconcile => {
                trace!("Processing Reconcile");
                let outcome = SessionReconciler::new(&self.storage, &self.context).reconcile();
                self.session
                    .set_last_session_crash(outcome.last_session_crash);
            }

            Command::Start => {
                trace!("Processing Start");
                self.process_pending();
            }

            Command::LastSessionCrashReport { reply } => {
                let _ = reply.send(Ok(self.session.last_session_crash()));
            }

            Command::HasCrashedInLastSession { reply } => {
                let _ = reply.send(Ok(self.session.has_crashed()));
            }

            Command::MinidumpDirectory { reply } => {
                let _ = reply.send(self.storage.new_minidump_directory().map_err(Into::into));
            }

            Command::NotifyUserConfirmation { decision, reply } => {
                trace!(%decision, "Processing NotifyUserConfirmation");
                for candidate in self.gate.resolve(decision) {
                    self.coordinator.deliver(candidate);
                }
                let _ = reply.send(Ok(()));
            }

            Command::Delivery(event) => self.process_delivery_event(event),

            Command::Flush { reply } => {
                let _ = reply.send(Ok(()));
            }

            Command::Disable { reply } => {
                let _ = reply.send(Ok(self.disable()));
                return false;
            }

            Command::Shutdown => return false,
        }
        true
    }

    /// Feeds every stored, not-yet-enqueued, untracked report to the gate.
    fn process_pending(&mut self) {
        let stored = match self.storage.list_stored_reports() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to list stored reports");
                return;
            }
        };

        let batch: Vec<Candidate> = stored
            .into_iter()
            .filter(|s| !s.enqueued && !self.tracker.contains(&s.log.id))
            .map(|s| {
                let throwable = self.storage.read_raw_failure(&s.log.id);
                Candidate {
                    report: ErrorReport::from_log(&s.log, throwable),
                    log: s.log,
                }
            })
            .collect();

        debug!(count = batch.len(), "Processing stored reports");
        for candidate in self.gate.admit(batch) {
            self.coordinator.deliver(candidate);
        }
    }

    fn process_delivery_event(&mut self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::BeforeSending(log) => self.coordinator.on_before_sending(&log),
            DeliveryEvent::Success(log) => self.coordinator.on_success(&log),
            DeliveryEvent::Failure(log, error) => self.coordinator.on_failure(&log, &error),
        }
    }

    /// Deletes every local artifact and unregisters from the channel.
    ///
    /// Confirmations still awaiting the user are cancelled first, which
    /// deletes their reports. The sweep then removes every other report
    /// left on disk: ones not yet processed and ones handed to the channel
    /// that have no outcome yet. Each report is counted once.
    ///
    /// The cleanup flag brackets the sweep so an interrupted one is
    /// completed by the next pipeline built on this storage.
    fn disable(&mut self) -> DisableSummary {
        if let Err(e) = self.flag_store.put_bool(CLEANUP_PENDING_KEY, true) {
            warn!(error = %e, "Failed to record pending cleanup");
        }

        let cancelled = self.gate.cancel();
        let retired = self.tracker.discard_all_live();
        let swept = self.storage.delete_all();
        self.session.set_last_session_crash(None);
        self.channel.remove_group(self.coordinator.group_name());

        if let Err(e) = self.flag_store.remove(CLEANUP_PENDING_KEY) {
            warn!(error = %e, "Failed to clear pending cleanup");
        }
        info!(cancelled, retired, swept, "Crash pipeline disabled");
        DisableSummary { cancelled, swept }
    }
}
