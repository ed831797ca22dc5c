//! Delivery channel port (driven/secondary port)
//!
//! The store-and-forward channel that batches, persists and transmits logs.
//! Grouping, HTTP retries and batching are the channel's business; the crash
//! pipeline only registers a group, enqueues logs into it and reacts to the
//! per-log outcome callbacks.
//!
//! ## Design Notes
//!
//! - Methods are synchronous hand-offs: `enqueue` must not wait for the
//!   network, it only records the log in the channel's own storage.
//! - Group listener callbacks may arrive on any channel thread. The crash
//!   pipeline's implementation only posts them to its worker.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{Flags, Log};

/// Batching settings for one channel group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSettings {
    /// Logs per batch before a batch is sent
    pub max_logs_per_batch: usize,
    /// Maximum time a log waits before its batch is sent
    pub batch_interval: Duration,
    /// Batches that may be in flight at the same time
    pub max_parallel_batches: usize,
    /// Ingestion endpoint overriding the channel default
    pub custom_ingestion: Option<String>,
}

/// Failure reported by the channel for one log
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DeliveryError {
    message: String,
    permanent: bool,
}

impl DeliveryError {
    /// A failure the channel will not retry
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: true,
        }
    }

    /// A failure the channel keeps retrying on its own
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: false,
        }
    }

    /// Returns true when the channel gave up on the log
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Returns the failure description
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Callbacks a channel group invokes for each of its logs
pub trait IGroupListener: Send + Sync {
    /// The log is about to be sent
    fn on_before_sending(&self, log: &Log);

    /// The log was delivered
    fn on_success(&self, log: &Log);

    /// The log could not be delivered
    fn on_failure(&self, log: &Log, error: &DeliveryError);
}

/// Port trait for the store-and-forward delivery channel
pub trait IDeliveryChannel: Send + Sync {
    /// Registers a group and the listener receiving its outcomes
    fn add_group(
        &self,
        group_name: &str,
        settings: GroupSettings,
        listener: Arc<dyn IGroupListener>,
    );

    /// Unregisters a group; logs already persisted by the channel are kept
    fn remove_group(&self, group_name: &str);

    /// Hands a log to the channel, returning whether it was accepted
    fn enqueue(&self, log: Log, group_name: &str, flags: Flags) -> bool;
}
