//! Error report codec
//!
//! Converts captured failures into their two durable forms and back:
//!
//! - the **managed error log** (`{id}.json`), capped at [`FRAME_LIMIT`]
//!   frames per exception and [`CAUSE_LIMIT`] exceptions per chain;
//! - the **raw failure** (`{id}.throwable`), which keeps the whole cause
//!   chain for local reconstruction of the [`ErrorReport`].
//!
//! Reading the raw form back is allowed to fail (a chain nested deeper than
//! the JSON recursion limit cannot be parsed). That only clears the
//! reconstructed throwable; the managed log stays valid and sendable.

use chrono::{DateTime, Utc};

use crate::domain::{
    DeviceContext, ErrorReport, ExceptionInfo, Failure, Flags, ManagedErrorLog, ReportId,
    StackFrame, ThreadInfo,
};

/// Maximum number of frames recorded per exception
pub const FRAME_LIMIT: usize = 256;

/// Maximum number of exceptions recorded per cause chain
pub const CAUSE_LIMIT: usize = 16;

/// Thread name recorded for reports synthesized from a minidump
pub const NATIVE_THREAD_NAME: &str = "native";

/// Process-level facts captured once and stamped on every report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    pub app_launch_timestamp: DateTime<Utc>,
    pub process_id: u32,
    pub process_name: String,
    pub device: DeviceContext,
}

impl CaptureContext {
    /// Snapshot of the current process, launched "now"
    pub fn current(app_name: &str, app_version: &str) -> Self {
        let process_name = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| app_name.to_string());
        Self {
            app_launch_timestamp: Utc::now(),
            process_id: std::process::id(),
            process_name,
            device: DeviceContext::collect(app_name, app_version),
        }
    }
}

// ============================================================================
// Managed form
// ============================================================================

/// Encodes a fatal failure raised on `thread` into a managed error log
///
/// The thread snapshot's frames are capped like an exception's.
pub fn encode(failure: &Failure, thread: &ThreadInfo, context: &CaptureContext) -> ManagedErrorLog {
    ManagedErrorLog {
        id: ReportId::new(),
        timestamp: Utc::now(),
        app_launch_timestamp: context.app_launch_timestamp,
        process_id: context.process_id,
        process_name: context.process_name.clone(),
        error_thread_name: thread.name.clone(),
        fatal: true,
        flags: Flags::PERSISTENCE_CRITICAL,
        exception: exception_chain(failure),
        threads: vec![ThreadInfo {
            id: thread.id.clone(),
            name: thread.name.clone(),
            frames: cap_frames(&thread.frames),
        }],
        device: context.device.clone(),
    }
}

/// Synthesizes the managed log of a native crash found as a minidump
///
/// Only minimal metadata is known: when the dump was written and the
/// context of the process now processing it.
pub fn encode_native(
    id: ReportId,
    crashed_at: DateTime<Utc>,
    context: &CaptureContext,
) -> ManagedErrorLog {
    ManagedErrorLog {
        id,
        timestamp: crashed_at,
        app_launch_timestamp: crashed_at,
        process_id: 0,
        process_name: context.process_name.clone(),
        error_thread_name: NATIVE_THREAD_NAME.to_string(),
        fatal: true,
        flags: Flags::PERSISTENCE_CRITICAL,
        exception: exception_chain(&Failure::native()),
        threads: Vec::new(),
        device: context.device.clone(),
    }
}

/// Builds the capped exception chain of a failure
///
/// Causes are walked outermost first. Each recorded exception keeps at most
/// [`FRAME_LIMIT`] frames; once [`CAUSE_LIMIT`] exceptions are recorded the
/// remaining causes are dropped.
pub fn exception_chain(failure: &Failure) -> ExceptionInfo {
    let mut recorded: Vec<ExceptionInfo> = failure
        .chain()
        .take(CAUSE_LIMIT)
        .map(|f| ExceptionInfo {
            kind: f.kind.clone(),
            message: f.message.clone(),
            frames: cap_frames(&f.frames),
            inner_exceptions: Vec::new(),
        })
        .collect();

    let mut inner: Option<ExceptionInfo> = None;
    while let Some(mut exception) = recorded.pop() {
        exception.inner_exceptions = inner.into_iter().collect();
        inner = Some(exception);
    }

    // `chain()` always yields at least the failure itself
    inner.unwrap_or_else(|| ExceptionInfo {
        kind: failure.kind.clone(),
        message: failure.message.clone(),
        frames: Vec::new(),
        inner_exceptions: Vec::new(),
    })
}

fn cap_frames(frames: &[StackFrame]) -> Vec<StackFrame> {
    frames.iter().take(FRAME_LIMIT).cloned().collect()
}

/// Serializes a managed log for `{id}.json`
pub fn encode_log(log: &ManagedErrorLog) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(log)
}

/// Parses a managed log read from `{id}.json`
pub fn decode_log(bytes: &[u8]) -> serde_json::Result<ManagedErrorLog> {
    serde_json::from_slice(bytes)
}

// ============================================================================
// Raw form
// ============================================================================

/// Serializes the raw failure for `{id}.throwable`
///
/// Frames are capped per exception exactly like the managed form; the cause
/// chain is kept whole.
pub fn encode_raw(failure: &Failure) -> serde_json::Result<Vec<u8>> {
    let mut capped = failure.clone();
    let mut current = Some(&mut capped);
    while let Some(f) = current {
        f.frames.truncate(FRAME_LIMIT);
        current = f.cause.as_deref_mut();
    }
    serde_json::to_vec(&capped)
}

/// Reads a raw failure back, returning `None` when it cannot be reconstructed
pub fn decode_raw(bytes: &[u8]) -> Option<Failure> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(failure) => Some(failure),
        Err(e) => {
            tracing::debug!(error = %e, "Raw failure could not be reconstructed");
            None
        }
    }
}

/// Decodes a stored report from its managed log and optional raw failure
///
/// Returns `None` only when the managed log itself is unreadable. A missing
/// or unreadable raw failure yields a report without a throwable.
pub fn decode(log_bytes: &[u8], raw_bytes: Option<&[u8]>) -> Option<ErrorReport> {
    let log = decode_log(log_bytes).ok()?;
    let throwable = raw_bytes.and_then(decode_raw);
    Some(ErrorReport::from_log(&log, throwable))
}
