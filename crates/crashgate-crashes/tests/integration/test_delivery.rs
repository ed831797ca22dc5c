//! Enqueueing into the delivery channel, outcomes and disable

use std::fs;
use std::sync::Arc;

use crashgate_core::domain::{
    ErrorAttachmentLog, ErrorReport, Failure, Flags, ReportState, CONTENT_TYPE_TEXT_PLAIN,
};
use crashgate_core::ports::{CrashesListener, DeliveryError, IFlagStore, CLEANUP_PENDING_KEY};

use crate::common::*;

#[test]
fn test_files_remain_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("deliver me"));
    let channel = RecordingChannel::new();
    let listener = ScriptedListener::new();

    let pipeline = launch(dir.path(), channel.clone(), listener.clone(), MemoryFlagStore::new());
    pipeline.start();
    pipeline.flush().wait().unwrap();

    assert_eq!(pipeline.report_state(&id), Some(ReportState::Enqueued));
    assert!(dir.path().join(format!("{id}.json")).exists());
    assert!(dir.path().join(format!("{id}.throwable")).exists());
    assert!(dir.path().join(format!("{id}.enqueued")).exists());

    let log = channel.log_of(&id);
    channel.before_sending(&log);
    pipeline.flush().wait().unwrap();
    assert!(!files_of(dir.path(), &id).is_empty());

    channel.succeed(&log);
    pipeline.flush().wait().unwrap();

    assert!(files_of(dir.path(), &id).is_empty());
    assert_eq!(pipeline.report_state(&id), Some(ReportState::Sent));
    assert_eq!(
        listener.events_for(&id),
        vec![
            "should_process",
            "get_error_attachments",
            "on_before_sending",
            "on_sending_succeeded",
        ]
    );
}

#[test]
fn test_permanent_failure_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("rejected by server"));
    let channel = RecordingChannel::new();
    let listener = ScriptedListener::new();

    let pipeline = launch(dir.path(), channel.clone(), listener.clone(), MemoryFlagStore::new());
    pipeline.start();
    pipeline.flush().wait().unwrap();

    channel.fail(&channel.log_of(&id), DeliveryError::permanent("HTTP 400"));
    pipeline.flush().wait().unwrap();

    assert!(files_of(dir.path(), &id).is_empty());
    assert_eq!(pipeline.report_state(&id), Some(ReportState::Failed));
    assert_eq!(listener.count("on_sending_failed"), 1);
}

#[test]
fn test_transient_failure_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("offline"));
    let channel = RecordingChannel::new();
    let listener = ScriptedListener::new();

    let pipeline = launch(dir.path(), channel.clone(), listener.clone(), MemoryFlagStore::new());
    pipeline.start();
    pipeline.flush().wait().unwrap();

    let log = channel.log_of(&id);
    channel.fail(&log, DeliveryError::transient("connection reset"));
    pipeline.flush().wait().unwrap();

    assert!(dir.path().join(format!("{id}.json")).exists());
    assert_eq!(pipeline.report_state(&id), Some(ReportState::Enqueued));
    assert_eq!(listener.count("on_sending_failed"), 0);

    channel.succeed(&log);
    pipeline.flush().wait().unwrap();
    assert!(files_of(dir.path(), &id).is_empty());
}

#[test]
fn test_outcome_in_later_process() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("sent by the next run"));

    let first_channel = RecordingChannel::new();
    let first = launch(
        dir.path(),
        first_channel.clone(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );
    first.start();
    first.flush().wait().unwrap();
    let log = first_channel.log_of(&id);
    drop(first);

    let channel = RecordingChannel::new();
    let listener = ScriptedListener::new();
    let second = launch(dir.path(), channel.clone(), listener.clone(), MemoryFlagStore::new());
    assert!(!second.has_crashed_in_last_session().wait().unwrap());

    channel.succeed(&log);
    second.flush().wait().unwrap();

    assert_eq!(listener.events_for(&id), vec!["on_sending_succeeded"]);
    assert!(files_of(dir.path(), &id).is_empty());
}

#[test]
fn test_no_duplicate_sending_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("only once"));

    let mut total = 0;
    for _ in 0..3 {
        let channel = RecordingChannel::new();
        let pipeline = launch(
            dir.path(),
            channel.clone(),
            ScriptedListener::new(),
            MemoryFlagStore::new(),
        );
        pipeline.start();
        pipeline.flush().wait().unwrap();
        total += channel.error_logs().len();
    }

    assert_eq!(total, 1);
    assert!(dir.path().join(format!("{id}.json")).exists());
}

#[test]
fn test_rejected_enqueue_is_retried_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("channel full"));

    let channel = RecordingChannel::new();
    channel.reject_enqueues();
    let first = launch(dir.path(), channel.clone(), ScriptedListener::new(), MemoryFlagStore::new());
    first.start();
    first.flush().wait().unwrap();
    assert!(first.report_state(&id).is_none());
    assert!(!dir.path().join(format!("{id}.enqueued")).exists());
    drop(first);

    let channel = RecordingChannel::new();
    let second = launch(dir.path(), channel.clone(), ScriptedListener::new(), MemoryFlagStore::new());
    second.start();
    second.flush().wait().unwrap();
    assert_eq!(channel.error_logs()[0].id, id);
}

#[test]
fn test_attachments_follow_error_log() {
    let dir = tempfile::tempdir().unwrap();
    leave_minidump(dir.path(), "native.dmp", b"minidump bytes");
    let channel = RecordingChannel::new();
    let listener = ScriptedListener::new();
    *listener.attachments.lock().unwrap() = vec![
        ErrorAttachmentLog::attachment_with_text("last 20 log lines", "log.txt"),
        ErrorAttachmentLog::attachment_with_binary(Vec::new(), "empty.bin", "application/x-empty"),
        ErrorAttachmentLog::attachment_with_binary(vec![1, 2, 3], "state.bin", "application/x-state"),
    ];

    let pipeline = launch(dir.path(), channel.clone(), listener.clone(), MemoryFlagStore::new());
    let report = pipeline.last_session_crash_report().wait().unwrap().unwrap();
    pipeline.start();
    pipeline.flush().wait().unwrap();

    let enqueued = channel.enqueued();
    assert_eq!(enqueued.len(), 4);
    assert!(enqueued[0].log.as_managed_error().is_some());
    assert_eq!(enqueued[0].flags, Flags::PERSISTENCE_CRITICAL);
    assert!(enqueued[1..].iter().all(|e| e.flags == Flags::DEFAULTS));
    assert!(enqueued.iter().all(|e| e.group == GROUP));

    let attachments = channel.attachments();
    let names: Vec<_> = attachments
        .iter()
        .map(|a| a.file_name.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["native.dmp", "log.txt", "state.bin"]);
    assert!(attachments.iter().all(|a| a.error_id == Some(*report.id())));
    assert_eq!(attachments[1].content_type, CONTENT_TYPE_TEXT_PLAIN);
    assert_eq!(attachments[1].data, b"last 20 log lines");
}

struct PanickingListener;

impl CrashesListener for PanickingListener {
    fn get_error_attachments(&self, _report: &ErrorReport) -> Vec<ErrorAttachmentLog> {
        panic!("listener bug");
    }
}

#[test]
fn test_panicking_listener_discards_report() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("unlucky"));
    let channel = RecordingChannel::new();
    let config = crashgate_core::config::ConfigBuilder::new()
        .storage_root(dir.path().to_path_buf())
        .build();

    let pipeline = crashgate_crashes::CrashPipeline::builder(config)
        .channel(channel.clone())
        .listener(Arc::new(PanickingListener))
        .flag_store(MemoryFlagStore::new())
        .install_hook(false)
        .build()
        .unwrap();
    pipeline.start();
    pipeline.flush().wait().unwrap();

    assert!(channel.enqueued().is_empty());
    assert!(files_of(dir.path(), &id).is_empty());
    assert_eq!(pipeline.report_state(&id), Some(ReportState::Discarded));

    // The worker is still serving requests
    assert!(pipeline.minidump_directory().wait().is_ok());
}

#[test]
fn test_disable_sweeps_local_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("never sent"));
    leave_minidump(dir.path(), "native.dmp", b"pending dump");
    let channel = RecordingChannel::new();
    let flags = MemoryFlagStore::new();

    let pipeline = launch(
        dir.path(),
        channel.clone(),
        ScriptedListener::awaiting_confirmation(),
        flags.clone(),
    );
    let session = pipeline.minidump_directory().wait().unwrap();
    fs::write(session.join("live.dmp"), b"this session").unwrap();
    pipeline.start();
    pipeline.flush().wait().unwrap();

    let summary = pipeline.disable().wait().unwrap();

    // The crash and the reconciled minidump were both awaiting the user
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.swept, 0);
    assert_eq!(summary.total(), 2);
    assert!(channel.enqueued().is_empty());
    assert!(report_files(dir.path()).is_empty());
    assert!(files_of(dir.path(), &id).is_empty());
    assert!(files_under(&dir.path().join("minidump")).is_empty());
    assert!(!channel.has_group(GROUP));
    assert_eq!(channel.removed_groups(), vec![GROUP.to_string()]);
    assert!(!flags.get_bool(CLEANUP_PENDING_KEY));
    assert_eq!(pipeline.report_state(&id), Some(ReportState::Discarded));
}

#[test]
fn test_interrupted_disable_completes_on_next_build() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("left behind"));
    leave_minidump(dir.path(), "native.dmp", b"left behind too");
    let flags = MemoryFlagStore::new();
    flags.put_bool(CLEANUP_PENDING_KEY, true).unwrap();

    let channel = RecordingChannel::new();
    let pipeline = launch(dir.path(), channel.clone(), ScriptedListener::new(), flags.clone());

    assert!(!pipeline.has_crashed_in_last_session().wait().unwrap());
    assert!(files_of(dir.path(), &id).is_empty());
    assert!(files_under(&dir.path().join("minidump")).is_empty());
    assert!(!flags.get_bool(CLEANUP_PENDING_KEY));

    pipeline.start();
    pipeline.flush().wait().unwrap();
    assert!(channel.enqueued().is_empty());
}

#[test]
fn test_disable_counts_each_report_once() {
    let dir = tempfile::tempdir().unwrap();
    let awaiting = [
        crash(dir.path(), Failure::panic("waiting one")),
        crash(dir.path(), Failure::panic("waiting two")),
    ];
    let channel = RecordingChannel::new();
    let pipeline = launch(
        dir.path(),
        channel.clone(),
        ScriptedListener::awaiting_confirmation(),
        MemoryFlagStore::new(),
    );
    pipeline.start();
    pipeline.flush().wait().unwrap();

    // Arrives after the prompt was raised, so it is never gated
    let unprocessed = crash(dir.path(), Failure::panic("written late"));

    let summary = pipeline.disable().wait().unwrap();

    assert_eq!(summary.cancelled, awaiting.len());
    assert_eq!(summary.swept, 1);
    assert_eq!(summary.total(), 3);
    assert!(report_files(dir.path()).is_empty());
    assert!(files_of(dir.path(), &unprocessed).is_empty());
    assert!(channel.enqueued().is_empty());
}

#[test]
fn test_unwritable_marker_leaves_report_for_later() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("marker blocked"));
    let blocker = dir.path().join(format!("{id}.enqueued.tmp"));
    fs::create_dir(&blocker).unwrap();
    let channel = RecordingChannel::new();

    for _ in 0..2 {
        let pipeline = launch(
            dir.path(),
            channel.clone(),
            ScriptedListener::new(),
            MemoryFlagStore::new(),
        );
        pipeline.start();
        pipeline.flush().wait().unwrap();
        assert_eq!(pipeline.report_state(&id), None);
    }
    assert!(channel.error_logs().is_empty());
    assert!(dir.path().join(format!("{id}.json")).exists());
    assert!(!dir.path().join(format!("{id}.enqueued")).exists());

    fs::remove_dir(&blocker).unwrap();
    for _ in 0..2 {
        let pipeline = launch(
            dir.path(),
            channel.clone(),
            ScriptedListener::new(),
            MemoryFlagStore::new(),
        );
        pipeline.start();
        pipeline.flush().wait().unwrap();
    }

    let logs = channel.error_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, id);
    assert!(dir.path().join(format!("{id}.enqueued")).exists());
}
