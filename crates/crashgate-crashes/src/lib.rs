//! crashgate crashes - capture, reconcile, confirm and deliver crash reports
//!
//! This crate implements the pipeline on top of `crashgate-core` and
//! `crashgate-storage`:
//! - [`capture`] - the process-wide panic hook, persisting synchronously
//! - [`reconciler`] - start-of-session scan of stored reports and minidumps
//! - [`gate`] - per-report filtering and the user confirmation prompt
//! - [`coordinator`] - enqueueing into the delivery channel and outcome handling
//! - [`worker`] - the single thread that serializes all of the above
//! - [`pipeline`] - the [`CrashPipeline`] facade the application holds
//!
//! Accessors return a [`Deferred`], which can be awaited or waited on.

pub mod backtrace;
pub mod capture;
pub mod coordinator;
pub mod deferred;
pub mod error;
pub mod gate;
mod guarded;
pub mod pipeline;
pub mod reconciler;
pub mod tracker;
pub mod worker;

pub use capture::{CaptureHook, CaptureScope, HookRegistration};
pub use deferred::Deferred;
pub use error::{CrashesError, Result};
pub use pipeline::{CrashPipeline, CrashPipelineBuilder};
pub use reconciler::{ReconcileOutcome, SessionReconciler};
pub use tracker::ReportTracker;
pub use worker::DisableSummary;
