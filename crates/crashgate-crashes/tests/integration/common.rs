//! Shared helpers for crash pipeline integration tests
//!
//! Provides an in-memory delivery channel that records every enqueue and lets
//! tests drive the per-log outcome callbacks, a scripted listener that records
//! which hooks ran, and helpers that simulate a crash in an earlier process by
//! writing reports straight to a storage root.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crashgate_core::codec::CaptureContext;
use crashgate_core::config::ConfigBuilder;
use crashgate_core::domain::{
    ErrorAttachmentLog, ErrorReport, Failure, Flags, Log, ManagedErrorLog, ReportId, ThreadInfo,
};
use crashgate_core::ports::{
    CrashesListener, DeliveryError, GroupSettings, IDeliveryChannel, IFlagStore, IGroupListener,
};
use crashgate_crashes::{CaptureHook, CrashPipeline, CrashPipelineBuilder};
use crashgate_storage::ErrorStorage;

pub const GROUP: &str = "groupErrors";

// ============================================================================
// Delivery channel
// ============================================================================

/// One `enqueue` call seen by the channel
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub log: Log,
    pub group: String,
    pub flags: Flags,
}

/// Delivery channel that only records; outcomes are triggered by the test.
pub struct RecordingChannel {
    accept: AtomicBool,
    groups: Mutex<HashMap<String, Arc<dyn IGroupListener>>>,
    enqueued: Mutex<Vec<Enqueued>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accept: AtomicBool::new(true),
            groups: Mutex::new(HashMap::new()),
            enqueued: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        })
    }

    /// Makes subsequent `enqueue` calls fail
    pub fn reject_enqueues(&self) {
        self.accept.store(false, Ordering::SeqCst);
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.lock().unwrap().contains_key(group)
    }

    pub fn removed_groups(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn enqueued(&self) -> Vec<Enqueued> {
        self.enqueued.lock().unwrap().clone()
    }

    /// Managed error logs enqueued so far, in order
    pub fn error_logs(&self) -> Vec<ManagedErrorLog> {
        self.enqueued()
            .into_iter()
            .filter_map(|e| e.log.as_managed_error().cloned())
            .collect()
    }

    /// Attachments enqueued so far, in order
    pub fn attachments(&self) -> Vec<ErrorAttachmentLog> {
        self.enqueued()
            .into_iter()
            .filter_map(|e| match e.log {
                Log::Attachment(attachment) => Some(attachment),
                Log::ManagedError(_) => None,
            })
            .collect()
    }

    /// The enqueued managed log of a report
    pub fn log_of(&self, id: &ReportId) -> Log {
        self.enqueued()
            .into_iter()
            .map(|e| e.log)
            .find(|log| log.as_managed_error().is_some_and(|l| &l.id == id))
            .unwrap_or_else(|| panic!("no error log enqueued for {id}"))
    }

    fn listener(&self) -> Arc<dyn IGroupListener> {
        Arc::clone(
            self.groups
                .lock()
                .unwrap()
                .get(GROUP)
                .expect("error group registered"),
        )
    }

    pub fn before_sending(&self, log: &Log) {
        self.listener().on_before_sending(log);
    }

    pub fn succeed(&self, log: &Log) {
        self.listener().on_success(log);
    }

    pub fn fail(&self, log: &Log, error: DeliveryError) {
        self.listener().on_failure(log, &error);
    }
}

impl IDeliveryChannel for RecordingChannel {
    fn add_group(&self, group_name: &str, _settings: GroupSettings, listener: Arc<dyn IGroupListener>) {
        self.groups
            .lock()
            .unwrap()
            .insert(group_name.to_string(), listener);
    }

    fn remove_group(&self, group_name: &str) {
        self.groups.lock().unwrap().remove(group_name);
        self.removed.lock().unwrap().push(group_name.to_string());
    }

    fn enqueue(&self, log: Log, group_name: &str, flags: Flags) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.enqueued.lock().unwrap().push(Enqueued {
            log,
            group: group_name.to_string(),
            flags,
        });
        true
    }
}

// ============================================================================
// Flag store
// ============================================================================

#[derive(Default)]
pub struct MemoryFlagStore {
    flags: Mutex<HashMap<String, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl IFlagStore for MemoryFlagStore {
    fn get_bool(&self, key: &str) -> bool {
        self.flags.lock().unwrap().get(key).copied().unwrap_or(false)
    }

    fn put_bool(&self, key: &str, value: bool) -> anyhow::Result<()> {
        self.flags.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.flags.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Listener whose answers are set by the test and whose calls are recorded
/// as `"<hook> <report id>"`.
#[derive(Default)]
pub struct ScriptedListener {
    pub decline: AtomicBool,
    pub await_confirmation: AtomicBool,
    pub attachments: Mutex<Vec<ErrorAttachmentLog>>,
    events: Mutex<Vec<String>>,
}

impl ScriptedListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn awaiting_confirmation() -> Arc<Self> {
        let listener = Self::default();
        listener.await_confirmation.store(true, Ordering::SeqCst);
        Arc::new(listener)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded hooks for one report, in call order
    pub fn events_for(&self, id: &ReportId) -> Vec<String> {
        let suffix = format!(" {id}");
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_suffix(&suffix).map(str::to_string))
            .collect()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.split(' ').next() == Some(hook))
            .count()
    }

    fn record(&self, hook: &str, report: Option<&ErrorReport>) {
        let event = match report {
            Some(report) => format!("{hook} {}", report.id()),
            None => hook.to_string(),
        };
        self.events.lock().unwrap().push(event);
    }
}

impl CrashesListener for ScriptedListener {
    fn should_process(&self, report: &ErrorReport) -> bool {
        self.record("should_process", Some(report));
        !self.decline.load(Ordering::SeqCst)
    }

    fn should_await_user_confirmation(&self) -> bool {
        self.record("should_await_user_confirmation", None);
        self.await_confirmation.load(Ordering::SeqCst)
    }

    fn get_error_attachments(&self, report: &ErrorReport) -> Vec<ErrorAttachmentLog> {
        self.record("get_error_attachments", Some(report));
        self.attachments.lock().unwrap().clone()
    }

    fn on_before_sending(&self, report: &ErrorReport) {
        self.record("on_before_sending", Some(report));
    }

    fn on_sending_succeeded(&self, report: &ErrorReport) {
        self.record("on_sending_succeeded", Some(report));
    }

    fn on_sending_failed(&self, report: &ErrorReport, _error: &DeliveryError) {
        self.record("on_sending_failed", Some(report));
    }
}

// ============================================================================
// Processes
// ============================================================================

pub fn context() -> CaptureContext {
    CaptureContext::current("integration-app", "2.4.1")
}

/// Persists a crash the way a previous process's hook would have.
pub fn crash(root: &Path, failure: Failure) -> ReportId {
    let hook = CaptureHook::new(Arc::new(ErrorStorage::new(root)), context());
    let thread = ThreadInfo {
        id: "ThreadId(1)".into(),
        name: "main".into(),
        frames: Vec::new(),
    };
    hook.save_failure(&failure, &thread)
        .expect("crash report persisted")
}

/// Leaves a minidump in a previous session's `new` folder.
pub fn leave_minidump(root: &Path, file_name: &str, contents: &[u8]) -> PathBuf {
    let session = root.join("minidump").join("new").join("previous-session");
    std::fs::create_dir_all(&session).unwrap();
    let dump = session.join(file_name);
    std::fs::write(&dump, contents).unwrap();
    dump
}

/// Builds a pipeline on `root` without installing the panic hook.
pub fn launch(
    root: &Path,
    channel: Arc<RecordingChannel>,
    listener: Arc<ScriptedListener>,
    flags: Arc<dyn IFlagStore>,
) -> CrashPipeline {
    pipeline_builder(root, channel, flags)
        .listener(listener)
        .build()
        .expect("pipeline built")
}

/// Builder with the test app identity and no panic hook; no listener set
pub fn pipeline_builder(
    root: &Path,
    channel: Arc<RecordingChannel>,
    flags: Arc<dyn IFlagStore>,
) -> CrashPipelineBuilder {
    let config = ConfigBuilder::new()
        .storage_root(root.to_path_buf())
        .app("integration-app", "2.4.1")
        .build();
    CrashPipeline::builder(config)
        .channel(channel)
        .flag_store(flags)
        .install_hook(false)
}

/// Files in the report directory that belong to `id`, plus its pending
/// minidump folder
pub fn files_of(root: &Path, id: &ReportId) -> Vec<PathBuf> {
    let prefix = id.to_string();
    let mut files: Vec<PathBuf> = std::fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&prefix))
                })
                .collect()
        })
        .unwrap_or_default();
    let pending = root.join("minidump").join("pending").join(&prefix);
    if pending.exists() {
        files.push(pending);
    }
    files
}

/// Every stored report file (`*.json`) in the directory
pub fn report_files(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().is_some_and(|ext| ext == "json")
                        && p.file_name().is_some_and(|n| n != "flags.json")
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Every regular file under `dir`, recursively
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_under(&path));
            } else {
                found.push(path);
            }
        }
    }
    found
}
