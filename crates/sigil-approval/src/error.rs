//! Approval error types.

/// Errors from approval storage.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// Reading or writing the approvals file failed.
    #[error("approval storage I/O error at {path}: {message}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error message.
        message: String,
    },

    /// The approvals file is not valid.
    #[error("approval storage format error: {0}")]
    Format(String),
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
