//! Runtime error types.

use thiserror::Error;

use crate::instance::{InstanceId, InstanceState};

/// Errors returned by instance manager operations and application runtimes.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No instance with this ID.
    #[error("unknown instance: {id}")]
    UnknownInstance {
        /// The instance ID.
        id: InstanceId,
    },

    /// The instance does not take streamed bytes, or its stream has ended.
    #[error("instance {id} is not accepting stream data")]
    NotStreaming {
        /// The instance ID.
        id: InstanceId,
    },

    /// Only instances that failed for a network reason can be retried.
    #[error("instance {id} cannot be retried from state {state}")]
    NotRetryable {
        /// The instance ID.
        id: InstanceId,
        /// Its current state.
        state: InstanceState,
    },

    /// Streamed package exceeds the size limit.
    #[error("package exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: u64,
    },

    /// The application runtime could not start the payload.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Package could not be read.
    #[error("package error: {0}")]
    Package(#[from] sigil_package::PackageError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
