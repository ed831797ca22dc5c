//! Error types for the crash pipeline

use crashgate_core::domain::DomainError;
use crashgate_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the crash pipeline
///
/// Only construction and deferred accessors return these to the
/// application. Failures while processing a single report are logged and
/// retire that report instead.
#[derive(Debug, Error)]
pub enum CrashesError {
    /// Report storage failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An illegal report state transition was attempted
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Filesystem or thread spawn failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The builder was not given a delivery channel
    #[error("no delivery channel configured")]
    MissingChannel,

    /// The configuration did not validate
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Application listener code panicked
    #[error("listener callback {callback} panicked: {message}")]
    ListenerPanicked {
        callback: &'static str,
        message: String,
    },

    /// The worker has stopped (pipeline disabled or dropped)
    #[error("crash pipeline worker has stopped")]
    WorkerStopped,

    /// Waited on the worker thread for a result only the worker can produce
    #[error("waiting on the crash pipeline worker from its own thread would deadlock")]
    WouldDeadlock,
}

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, CrashesError>;
