//! Error types for report storage

use thiserror::Error;

/// Errors that can occur while reading or writing persisted reports
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A log or raw failure could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A minidump could not be associated with its report
    #[error("minidump association failed for {path}: {source}")]
    MinidumpMove {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
