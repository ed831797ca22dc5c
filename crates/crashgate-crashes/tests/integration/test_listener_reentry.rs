//! Listener callbacks that call back into the pipeline

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use crashgate_core::domain::{ErrorReport, Failure, ReportId};
use crashgate_core::ports::CrashesListener;
use crashgate_crashes::{CrashPipeline, CrashesError};

use crate::common::*;

/// What the pipeline answered from inside `should_process`
#[derive(Debug)]
struct Answers {
    crashed: bool,
    last_crash: Option<ReportId>,
    minidump_directory: PathBuf,
    flush: Result<(), CrashesError>,
}

/// Queries the pipeline it is attached to while deciding on a report
#[derive(Default)]
struct QueryingListener {
    pipeline: OnceLock<Weak<CrashPipeline>>,
    answers: Mutex<Option<Answers>>,
}

impl CrashesListener for QueryingListener {
    fn should_process(&self, _report: &ErrorReport) -> bool {
        let Some(pipeline) = self.pipeline.get().and_then(Weak::upgrade) else {
            return false;
        };
        let answers = Answers {
            crashed: pipeline.has_crashed_in_last_session().wait().unwrap(),
            last_crash: pipeline
                .last_session_crash_report()
                .wait()
                .unwrap()
                .map(|report| *report.id()),
            minidump_directory: pipeline.minidump_directory().wait().unwrap(),
            flush: pipeline.flush().wait(),
        };
        *self.answers.lock().unwrap() = Some(answers);
        true
    }
}

fn attached_pipeline(
    root: &std::path::Path,
    channel: Arc<RecordingChannel>,
) -> (Arc<CrashPipeline>, Arc<QueryingListener>) {
    let listener = Arc::new(QueryingListener::default());
    let pipeline = Arc::new(
        pipeline_builder(root, channel, MemoryFlagStore::new())
            .listener(listener.clone())
            .build()
            .unwrap(),
    );
    listener
        .pipeline
        .set(Arc::downgrade(&pipeline))
        .unwrap_or_else(|_| panic!("listener attached twice"));
    (pipeline, listener)
}

#[tokio::test]
async fn test_accessors_answer_inside_listener_callback() {
    let dir = tempfile::tempdir().unwrap();
    let id = crash(dir.path(), Failure::panic("queried from callback"));
    let channel = RecordingChannel::new();
    let (pipeline, listener) = attached_pipeline(dir.path(), channel.clone());

    pipeline.start();
    tokio::time::timeout(Duration::from_secs(10), pipeline.flush())
        .await
        .expect("worker stuck inside listener callback")
        .unwrap();

    let answers = listener.answers.lock().unwrap().take().expect("callback ran");
    assert!(answers.crashed);
    assert_eq!(answers.last_crash, Some(id));
    assert!(answers.minidump_directory.is_dir());
    assert!(matches!(answers.flush, Err(CrashesError::WouldDeadlock)));

    let logs = channel.error_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, id);
}

#[tokio::test]
async fn test_requests_from_callback_still_run_afterwards() {
    let dir = tempfile::tempdir().unwrap();
    crash(dir.path(), Failure::panic("first"));
    let channel = RecordingChannel::new();
    let (pipeline, listener) = attached_pipeline(dir.path(), channel.clone());

    pipeline.start();
    tokio::time::timeout(Duration::from_secs(10), pipeline.flush())
        .await
        .expect("worker stuck inside listener callback")
        .unwrap();
    assert!(listener.answers.lock().unwrap().is_some());

    // The flush queued from the callback did not wedge the worker
    let directory = tokio::time::timeout(Duration::from_secs(10), pipeline.minidump_directory())
        .await
        .expect("worker still answering")
        .unwrap();
    assert!(directory.is_dir());
}
