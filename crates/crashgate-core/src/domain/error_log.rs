//! Managed error log
//!
//! The structured, size-capped form of a captured failure. This is what is
//! written to `{id}.json` and what the delivery channel transmits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::DeviceContext;
use super::failure::StackFrame;
use super::flags::Flags;
use super::newtypes::ReportId;

/// One exception of a captured chain, as transmitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Failure type (`panic`, error type name, `NativeException`)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<StackFrame>,
    /// The chained cause, at most one element
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_exceptions: Vec<ExceptionInfo>,
}

impl ExceptionInfo {
    /// Number of exceptions in this chain, including this one
    pub fn chain_len(&self) -> usize {
        let mut count = 1;
        let mut current = self;
        while let Some(inner) = current.inner_exceptions.first() {
            count += 1;
            current = inner;
        }
        count
    }
}

/// Stack snapshot of one thread at crash time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<StackFrame>,
}

/// Durable, structured record of one captured failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedErrorLog {
    pub id: ReportId,
    /// When the failure happened
    pub timestamp: DateTime<Utc>,
    /// When the crashed process started
    pub app_launch_timestamp: DateTime<Utc>,
    pub process_id: u32,
    pub process_name: String,
    pub error_thread_name: String,
    /// Whether the failure terminated (or would terminate) the process
    pub fatal: bool,
    #[serde(default)]
    pub flags: Flags,
    pub exception: ExceptionInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<ThreadInfo>,
    pub device: DeviceContext,
}
