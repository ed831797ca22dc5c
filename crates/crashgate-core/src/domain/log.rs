//! Logs handed to the delivery channel

use serde::{Deserialize, Serialize};

use super::attachment::ErrorAttachmentLog;
use super::error_log::ManagedErrorLog;
use super::newtypes::ReportId;

/// A log enqueued in the delivery channel by the crash pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Log {
    /// The managed error log of a report
    ManagedError(Box<ManagedErrorLog>),
    /// One attachment of a report
    Attachment(ErrorAttachmentLog),
}

impl Log {
    /// Returns the report this log belongs to
    pub fn report_id(&self) -> Option<ReportId> {
        match self {
            Log::ManagedError(log) => Some(log.id),
            Log::Attachment(attachment) => attachment.error_id,
        }
    }

    /// Returns the managed error log, if this is one
    pub fn as_managed_error(&self) -> Option<&ManagedErrorLog> {
        match self {
            Log::ManagedError(log) => Some(log),
            Log::Attachment(_) => None,
        }
    }
}
