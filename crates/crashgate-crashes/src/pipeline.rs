//! Crash pipeline facade
//!
//! Wires storage, the capture hook, the worker and the delivery channel
//! together, and exposes the accessors the host application uses.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = CrashPipeline::builder(CrashesConfig::default())
//!     .channel(channel)
//!     .listener(Arc::new(MyListener))
//!     .build()?;
//!
//! if pipeline.has_crashed_in_last_session().await? {
//!     let report = pipeline.last_session_crash_report().await?;
//!     // ...
//! }
//! pipeline.start();
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crashgate_core::codec::CaptureContext;
use crashgate_core::config::CrashesConfig;
use crashgate_core::domain::{ErrorReport, Log, ReportId, ReportState, UserConfirmation};
use crashgate_core::ports::{
    CrashesListener, DefaultCrashesListener, DeliveryError, IDeliveryChannel, IFlagStore,
    IGroupListener, CLEANUP_PENDING_KEY,
};
use crashgate_storage::{ErrorStorage, FileFlagStore};

use crate::capture::{CaptureHook, CaptureScope, HookRegistration};
use crate::coordinator::DeliveryCoordinator;
use crate::deferred::Deferred;
use crate::error::{CrashesError, Result};
use crate::gate::ConfirmationGate;
use crate::tracker::ReportTracker;
use crate::worker::{
    on_worker_thread, Command, DeliveryEvent, DisableSummary, SessionView, Worker,
    WORKER_THREAD_NAME,
};

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`CrashPipeline`]
pub struct CrashPipelineBuilder {
    config: CrashesConfig,
    channel: Option<Arc<dyn IDeliveryChannel>>,
    flag_store: Option<Arc<dyn IFlagStore>>,
    listener: Arc<dyn CrashesListener>,
    storage_root: Option<PathBuf>,
    install_hook: bool,
    capture_scope: CaptureScope,
}

impl CrashPipelineBuilder {
    /// The delivery channel logs are enqueued into (required)
    pub fn channel(mut self, channel: Arc<dyn IDeliveryChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Durable flags; defaults to `flags.json` in the storage root
    pub fn flag_store(mut self, flag_store: Arc<dyn IFlagStore>) -> Self {
        self.flag_store = Some(flag_store);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn CrashesListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Overrides `storage.root` from the configuration
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Whether to install the panic hook on build (default: true)
    pub fn install_hook(mut self, install: bool) -> Self {
        self.install_hook = install;
        self
    }

    /// Which panics become reports (default: [`CaptureScope::AllThreads`])
    pub fn capture_scope(mut self, scope: CaptureScope) -> Self {
        self.capture_scope = scope;
        self
    }

    /// Creates storage, spawns the worker, registers the channel group,
    /// installs the hook and queues reconciliation.
    pub fn build(self) -> Result<CrashPipeline> {
        let errors = self.config.validate();
        if !errors.is_empty() {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(CrashesError::InvalidConfig(joined.join("; ")));
        }
        let channel = self.channel.ok_or(CrashesError::MissingChannel)?;

        let root = self
            .storage_root
            .unwrap_or_else(|| self.config.storage.root.clone());
        let storage = Arc::new(ErrorStorage::new(root));
        let flag_store: Arc<dyn IFlagStore> = match self.flag_store {
            Some(flag_store) => flag_store,
            None => Arc::new(FileFlagStore::in_dir(storage.root())),
        };

        if flag_store.get_bool(CLEANUP_PENDING_KEY) {
            info!("Completing interrupted cleanup");
            let deleted = storage.delete_all();
            debug!(deleted, "Interrupted cleanup completed");
            if let Err(e) = flag_store.remove(CLEANUP_PENDING_KEY) {
                warn!(error = %e, "Failed to clear pending cleanup");
            }
        }

        storage.ensure_layout()?;
        storage.new_minidump_directory()?;

        let context = CaptureContext::current(&self.config.app.name, &self.config.app.version);
        let tracker = ReportTracker::new(Arc::clone(&storage));
        let group_name = self.config.delivery.group_name.clone();

        let gate = ConfirmationGate::new(
            tracker.clone(),
            Arc::clone(&self.listener),
            Arc::clone(&flag_store),
        );
        let coordinator = DeliveryCoordinator::new(
            Arc::clone(&channel),
            Arc::clone(&storage),
            Arc::clone(&self.listener),
            tracker.clone(),
            group_name.clone(),
        );

        let session = Arc::new(SessionView::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(
            rx,
            Arc::clone(&storage),
            context.clone(),
            tracker.clone(),
            flag_store,
            Arc::clone(&channel),
            gate,
            coordinator,
            Arc::clone(&session),
        );
        let join = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())?;

        channel.add_group(
            &group_name,
            self.config.group_settings(),
            Arc::new(GroupListener { tx: tx.clone() }),
        );

        let pipeline = CrashPipeline {
            tx,
            capture: Arc::new(
                CaptureHook::new(Arc::clone(&storage), context).with_scope(self.capture_scope),
            ),
            storage,
            session,
            tracker,
            hook: Mutex::new(None),
            worker: Mutex::new(Some(join)),
        };
        if self.install_hook {
            pipeline.install_capture_hook();
        }
        pipeline.send(Command::Reconcile);

        info!(root = %pipeline.storage.root().display(), group = %group_name, "Crash pipeline built");
        Ok(pipeline)
    }
}

// ============================================================================
// CrashPipeline
// ============================================================================

/// The running crash-capture-and-delivery pipeline
///
/// Dropping the pipeline uninstalls the hook and stops the worker but keeps
/// stored reports; [`disable`](Self::disable) deletes them as well.
pub struct CrashPipeline {
    tx: mpsc::UnboundedSender<Command>,
    storage: Arc<ErrorStorage>,
    session: Arc<SessionView>,
    tracker: ReportTracker,
    capture: Arc<CaptureHook>,
    hook: Mutex<Option<HookRegistration>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CrashPipeline {
    pub fn builder(config: CrashesConfig) -> CrashPipelineBuilder {
        CrashPipelineBuilder {
            config,
            channel: None,
            flag_store: None,
            listener: Arc::new(DefaultCrashesListener),
            storage_root: None,
            install_hook: true,
            capture_scope: CaptureScope::default(),
        }
    }

    /// Starts processing stored reports. Nothing is enqueued before this.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// The crash of the previous session, if any
    ///
    /// Answered immediately when called from a listener callback.
    pub fn last_session_crash_report(&self) -> Deferred<Option<ErrorReport>> {
        if on_worker_thread() {
            return Deferred::ready(Ok(self.session.last_session_crash()));
        }
        self.request(|reply| Command::LastSessionCrashReport { reply })
    }

    pub fn has_crashed_in_last_session(&self) -> Deferred<bool> {
        if on_worker_thread() {
            return Deferred::ready(Ok(self.session.has_crashed()));
        }
        self.request(|reply| Command::HasCrashedInLastSession { reply })
    }

    /// Directory the native crash capturer of this process should write to
    pub fn minidump_directory(&self) -> Deferred<PathBuf> {
        if on_worker_thread() {
            return Deferred::ready(self.storage.new_minidump_directory().map_err(Into::into));
        }
        self.request(|reply| Command::MinidumpDirectory { reply })
    }

    /// Answers a pending confirmation request
    pub fn notify_user_confirmation(&self, decision: UserConfirmation) -> Deferred<()> {
        self.request(|reply| Command::NotifyUserConfirmation { decision, reply })
    }

    /// Resolves once everything queued before it has been processed
    pub fn flush(&self) -> Deferred<()> {
        self.request(|reply| Command::Flush { reply })
    }

    /// Lifecycle state of a report seen by this process
    pub fn report_state(&self, id: &ReportId) -> Option<ReportState> {
        self.tracker.state(id)
    }

    pub fn storage_root(&self) -> &Path {
        self.storage.root()
    }

    /// The hook used to persist failures of this process
    pub fn capture_hook(&self) -> Arc<CaptureHook> {
        Arc::clone(&self.capture)
    }

    /// Installs the panic hook; returns false when it already is.
    pub fn install_capture_hook(&self) -> bool {
        let mut hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner);
        if hook.is_some() {
            return false;
        }
        *hook = Some(Arc::clone(&self.capture).install());
        debug!("Capture hook installed");
        true
    }

    /// Restores the panic hook that was active before installation.
    pub fn uninstall_capture_hook(&self) {
        let registration = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(registration) = registration {
            registration.uninstall();
            debug!("Capture hook uninstalled");
        }
    }

    /// Uninstalls the hook, cancels pending confirmations, deletes every
    /// not-yet-sent local artifact, unregisters the channel group and stops
    /// the worker.
    ///
    /// Resolves to a [`DisableSummary`]: reports whose confirmation was
    /// cancelled, and every other report swept from disk (unprocessed, or
    /// handed to the channel without an outcome yet). Logs already handed
    /// to the channel are left to it.
    pub fn disable(&self) -> Deferred<DisableSummary> {
        self.uninstall_capture_hook();
        self.request(|reply| Command::Disable { reply })
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("Crash pipeline worker has stopped, command dropped");
        }
    }

    fn request<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Deferred<T> {
        let (reply, rx) = oneshot::channel();
        // A stopped worker drops the command and its reply sender, which
        // resolves the deferred to `WorkerStopped`
        self.send(make(reply));
        Deferred::new(rx)
    }
}

impl Drop for CrashPipeline {
    fn drop(&mut self) {
        self.uninstall_capture_hook();
        self.send(Command::Shutdown);

        let join = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join) = join {
            if !on_worker_thread() && join.join().is_err() {
                warn!("Crash pipeline worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for CrashPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashPipeline")
            .field("root", &self.storage.root())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Channel group listener
// ============================================================================

/// Forwards channel callbacks for managed logs to the worker.
///
/// Never blocks the channel's thread.
struct GroupListener {
    tx: mpsc::UnboundedSender<Command>,
}

impl GroupListener {
    fn post(&self, log: &Log, event: impl FnOnce(Log) -> DeliveryEvent) {
        if log.as_managed_error().is_none() {
            return;
        }
        if self.tx.send(Command::Delivery(event(log.clone()))).is_err() {
            debug!("Delivery outcome received after the worker stopped");
        }
    }
}

impl IGroupListener for GroupListener {
    fn on_before_sending(&self, log: &Log) {
        self.post(log, DeliveryEvent::BeforeSending);
    }

    fn on_success(&self, log: &Log) {
        self.post(log, DeliveryEvent::Success);
    }

    fn on_failure(&self, log: &Log, error: &DeliveryError) {
        self.post(log, |log| DeliveryEvent::Failure(log, error.clone()));
    }
}
