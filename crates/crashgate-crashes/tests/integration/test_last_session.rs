//! Last-session crash detection and start-of-session reconciliation

use std::fs;

use crashgate_core::codec::{CAUSE_LIMIT, FRAME_LIMIT};
use crashgate_core::domain::{Failure, Flags, ReportId, StackFrame, PANIC_KIND};
use crashgate_crashes::CrashesError;

use crate::common::*;

fn frames(count: usize) -> Vec<StackFrame> {
    (0..count)
        .map(|i| StackFrame::function(format!("app::layer::call_{i}")).in_app(true))
        .collect()
}

#[test]
fn test_crash_in_previous_session_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("attempt to divide by zero"));

    let pipeline = launch(
        dir.path(),
        RecordingChannel::new(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );

    assert!(pipeline.has_crashed_in_last_session().wait().unwrap());
    let report = pipeline
        .last_session_crash_report()
        .wait()
        .unwrap()
        .expect("last session crash");
    assert_eq!(report.id(), &id);
    assert_eq!(report.thread_name(), "main");
    let throwable = report.throwable().expect("throwable reconstructed");
    assert_eq!(throwable.kind, PANIC_KIND);
    assert_eq!(throwable.message.as_deref(), Some("attempt to divide by zero"));
    assert!(report.app_error_time() >= report.app_start_time());
}

#[test]
fn test_restarts_without_crash_report_nothing() {
    let dir = tempfile::tempdir().unwrap();

    for _ in 0..2 {
        let pipeline = launch(
            dir.path(),
            RecordingChannel::new(),
            ScriptedListener::new(),
            MemoryFlagStore::new(),
        );
        assert!(!pipeline.has_crashed_in_last_session().wait().unwrap());
        assert!(pipeline.last_session_crash_report().wait().unwrap().is_none());
    }
}

#[test]
fn test_most_recent_crash_wins() {
    let dir = tempfile::tempdir().unwrap();
    crash(dir.path(), Failure::panic("first"));
    let newest = crash(dir.path(), Failure::panic("second"));

    let pipeline = launch(
        dir.path(),
        RecordingChannel::new(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );
    let report = pipeline.last_session_crash_report().wait().unwrap().unwrap();
    assert_eq!(report.id(), &newest);
}

#[tokio::test]
async fn test_accessors_can_be_awaited() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("async caller"));

    let pipeline = launch(
        dir.path(),
        RecordingChannel::new(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );
    assert!(pipeline.has_crashed_in_last_session().await.unwrap());
    let report = pipeline.last_session_crash_report().await.unwrap().unwrap();
    assert_eq!(report.id(), &id);

    let minidumps = pipeline.minidump_directory().await.unwrap();
    assert!(minidumps.is_dir());
    assert!(minidumps.starts_with(dir.path().join("minidump").join("new")));
}

#[test]
fn test_huge_failure_is_capped_and_still_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let mut failure = Failure::new("RuntimeException", Some("level 0".into())).with_frames(frames(300));
    for level in 1..300 {
        failure = failure.caused_by(
            Failure::new("RuntimeException", Some(format!("level {level}"))).with_frames(frames(300)),
        );
    }
    let id = crash(dir.path(), failure);

    let channel = RecordingChannel::new();
    let pipeline = launch(
        dir.path(),
        channel.clone(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );

    // The raw form nests too deeply to be read back
    let report = pipeline.last_session_crash_report().wait().unwrap().unwrap();
    assert_eq!(report.id(), &id);
    assert!(report.throwable().is_none());

    pipeline.start();
    pipeline.flush().wait().unwrap();

    let enqueued = channel.enqueued();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].group, GROUP);
    assert_eq!(enqueued[0].flags, Flags::PERSISTENCE_CRITICAL);

    let log = &channel.error_logs()[0];
    assert_eq!(log.id, id);
    assert_eq!(log.exception.message.as_deref(), Some("level 0"));
    assert_eq!(log.exception.frames.len(), FRAME_LIMIT);
    assert_eq!(log.exception.chain_len(), CAUSE_LIMIT);
}

#[test]
fn test_minidump_becomes_native_report() {
    let dir = tempfile::tempdir().unwrap();
    let dump = leave_minidump(dir.path(), "crash.dmp", b"MDMP fake contents");

    let channel = RecordingChannel::new();
    let pipeline = launch(
        dir.path(),
        channel.clone(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );

    let report = pipeline.last_session_crash_report().wait().unwrap().unwrap();
    assert!(report.throwable().unwrap().is_native());
    assert_eq!(report.thread_name(), "native");
    assert!(!dump.exists());
    let pending = dir
        .path()
        .join("minidump")
        .join("pending")
        .join(report.id().to_string())
        .join("crash.dmp");
    assert_eq!(fs::read(&pending).unwrap(), b"MDMP fake contents");

    pipeline.start();
    pipeline.flush().wait().unwrap();

    assert_eq!(channel.error_logs()[0].id, *report.id());
    let attachments = channel.attachments();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].error_id, Some(*report.id()));
    assert_eq!(attachments[0].file_name.as_deref(), Some("crash.dmp"));
    assert_eq!(attachments[0].content_type, "application/octet-stream");
    assert_eq!(attachments[0].data, b"MDMP fake contents");
    assert!(!pending.exists());
}

#[test]
fn test_minidump_left_by_earlier_process_is_processed_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = launch(
        dir.path(),
        RecordingChannel::new(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );
    let session = first.minidump_directory().wait().unwrap();
    fs::write(session.join("native.dmp"), b"written by the native capturer").unwrap();
    // Still this session's folder: not picked up yet
    first.start();
    first.flush().wait().unwrap();
    assert!(session.join("native.dmp").exists());
    drop(first);

    let channel = RecordingChannel::new();
    let second = launch(
        dir.path(),
        channel.clone(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );
    assert!(second.has_crashed_in_last_session().wait().unwrap());
    assert!(!session.exists());
    assert_ne!(second.minidump_directory().wait().unwrap(), session);

    second.start();
    second.flush().wait().unwrap();
    assert_eq!(channel.error_logs().len(), 1);
    assert_eq!(channel.attachments()[0].data, b"written by the native capturer");
}

#[test]
fn test_failed_minidump_move_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let dump = leave_minidump(dir.path(), "crash.dmp", b"unmovable");
    // A file where the pending folder should be makes the move fail
    fs::write(dir.path().join("minidump").join("pending"), b"in the way").unwrap();

    let channel = RecordingChannel::new();
    let pipeline = launch(
        dir.path(),
        channel.clone(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );

    assert!(!pipeline.has_crashed_in_last_session().wait().unwrap());
    assert!(!dump.exists());
    assert!(report_files(dir.path()).is_empty());
    assert!(files_under(&dir.path().join("minidump").join("new")).is_empty());

    pipeline.start();
    pipeline.flush().wait().unwrap();
    assert!(channel.enqueued().is_empty());
}

#[test]
fn test_invalid_files_are_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let valid = crash(dir.path(), Failure::panic("valid"));
    let corrupt = ReportId::new();
    fs::write(dir.path().join(format!("{corrupt}.json")), b"{ not json").unwrap();
    let orphan = ReportId::new();
    fs::write(dir.path().join(format!("{orphan}.throwable")), b"{}").unwrap();
    fs::write(dir.path().join(format!("{valid}.json.tmp")), b"partial").unwrap();

    let pipeline = launch(
        dir.path(),
        RecordingChannel::new(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );

    let report = pipeline.last_session_crash_report().wait().unwrap().unwrap();
    assert_eq!(report.id(), &valid);
    assert!(files_of(dir.path(), &corrupt).is_empty());
    assert!(files_of(dir.path(), &orphan).is_empty());
    assert!(!dir.path().join(format!("{valid}.json.tmp")).exists());
    assert!(dir.path().join(format!("{valid}.json")).exists());
}

#[test]
fn test_accessors_fail_after_disable() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = launch(
        dir.path(),
        RecordingChannel::new(),
        ScriptedListener::new(),
        MemoryFlagStore::new(),
    );
    pipeline.disable().wait().unwrap();

    assert!(matches!(
        pipeline.has_crashed_in_last_session().wait(),
        Err(CrashesError::WorkerStopped)
    ));
}
