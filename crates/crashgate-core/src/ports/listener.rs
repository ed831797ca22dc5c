//! Crashes listener (driving port exposed to the host application)
//!
//! Every method has a default, so an application only overrides the hooks
//! it cares about. The pipeline calls these from its worker thread and never
//! assumes they return quickly. Pipeline read accessors may be used from a
//! callback; other requests made there resolve only after it returns.

use crate::domain::{ErrorAttachmentLog, ErrorReport};
use crate::ports::delivery_channel::DeliveryError;

/// Optional application hooks around report processing and delivery
pub trait CrashesListener: Send + Sync {
    /// Whether the report should be processed at all; `false` deletes it
    fn should_process(&self, _report: &ErrorReport) -> bool {
        true
    }

    /// Whether processing should wait for an explicit user confirmation
    fn should_await_user_confirmation(&self) -> bool {
        false
    }

    /// Attachments to send along with an approved report
    fn get_error_attachments(&self, _report: &ErrorReport) -> Vec<ErrorAttachmentLog> {
        Vec::new()
    }

    /// The report's managed log is about to be sent
    fn on_before_sending(&self, _report: &ErrorReport) {}

    /// The report's managed log was delivered
    fn on_sending_succeeded(&self, _report: &ErrorReport) {}

    /// The report's managed log failed permanently
    fn on_sending_failed(&self, _report: &ErrorReport, _error: &DeliveryError) {}
}

/// Listener used when the application registers none
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCrashesListener;

impl CrashesListener for DefaultCrashesListener {}
