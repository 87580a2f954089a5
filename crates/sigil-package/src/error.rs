//! Package error types.

use thiserror::Error;

/// Errors produced while reading or writing packages.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The container header or table of contents is malformed.
    #[error("corrupt package container: {0}")]
    CorruptContainer(String),

    /// The certificate chain block ends early or is internally inconsistent.
    #[error("truncated signature block")]
    TruncatedSignature,

    /// The underlying stream failed.
    #[error("package I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// The package manifest could not be parsed or is invalid.
    #[error("invalid package manifest: {0}")]
    InvalidManifest(String),

    /// A package could not be built from the given inputs.
    #[error("invalid package input: {0}")]
    InvalidInput(String),
}

impl PackageError {
    /// Whether this error comes from the package bytes themselves (as opposed
    /// to the stream that carried them).
    #[must_use]
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::CorruptContainer(_) | Self::TruncatedSignature | Self::InvalidManifest(_)
        )
    }
}

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;
