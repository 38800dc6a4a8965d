//! Error types for conveyor workers.

use std::io;

/// Boxed error returned by fallible transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Error type for worker and pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// `start` was called on a worker that already ran.
    #[error("worker {0}: already started")]
    AlreadyStarted(String),

    /// The OS refused to spawn the worker thread.
    #[error("worker {name}: spawn failed: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A consumer's transform rejected an item.
    #[error("worker {name}: transform failed: {source}")]
    Transform {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The worker thread panicked.
    #[error("worker {name}: panicked: {message}")]
    Panicked { name: String, message: String },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
