//! Domain entities and business rules
//!
//! This module contains the core domain types of the crash pipeline:
//! - Newtypes for report and attachment identifiers
//! - The captured failure model and its managed (transmitted) form
//! - Application-facing error reports and attachments
//! - Persistence flags and user confirmation decisions
//! - The per-report lifecycle state machine
//! - Domain-specific error types

pub mod attachment;
pub mod confirmation;
pub mod device;
pub mod error_log;
pub mod errors;
pub mod failure;
pub mod flags;
pub mod log;
pub mod newtypes;
pub mod report;
pub mod state;

// Re-export commonly used types
pub use attachment::{ErrorAttachmentLog, CONTENT_TYPE_OCTET_STREAM, CONTENT_TYPE_TEXT_PLAIN};
pub use confirmation::UserConfirmation;
pub use device::DeviceContext;
pub use error_log::{ExceptionInfo, ManagedErrorLog, ThreadInfo};
pub use errors::DomainError;
pub use failure::{Failure, StackFrame, NATIVE_EXCEPTION_KIND, PANIC_KIND};
pub use flags::Flags;
pub use log::Log;
pub use newtypes::{AttachmentId, ReportId};
pub use report::ErrorReport;
pub use state::ReportState;
