//! ErrorReport entity
//!
//! The application-facing view of a captured failure, handed to listener
//! callbacks and returned by the last-session accessors.

use chrono::{DateTime, Utc};

use super::device::DeviceContext;
use super::error_log::ManagedErrorLog;
use super::failure::Failure;
use super::newtypes::ReportId;

/// Immutable report about one captured failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    id: ReportId,
    thread_name: String,
    throwable: Option<Failure>,
    app_start_time: DateTime<Utc>,
    app_error_time: DateTime<Utc>,
    device: DeviceContext,
}

impl ErrorReport {
    /// Builds a report from its managed log and the reconstructed failure
    ///
    /// `throwable` is `None` when the raw form was missing or could not be
    /// read back; the report is still valid in that case.
    pub fn from_log(log: &ManagedErrorLog, throwable: Option<Failure>) -> Self {
        Self {
            id: log.id,
            thread_name: log.error_thread_name.clone(),
            throwable,
            app_start_time: log.app_launch_timestamp,
            app_error_time: log.timestamp,
            device: log.device.clone(),
        }
    }

    /// Returns the report identifier
    pub fn id(&self) -> &ReportId {
        &self.id
    }

    /// Returns the name of the thread that failed
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Returns the reconstructed failure, if it could be read back
    pub fn throwable(&self) -> Option<&Failure> {
        self.throwable.as_ref()
    }

    /// Returns when the crashed process started
    pub fn app_start_time(&self) -> DateTime<Utc> {
        self.app_start_time
    }

    /// Returns when the failure happened
    pub fn app_error_time(&self) -> DateTime<Utc> {
        self.app_error_time
    }

    /// Returns the device snapshot taken at capture time
    pub fn device(&self) -> &DeviceContext {
        &self.device
    }
}
