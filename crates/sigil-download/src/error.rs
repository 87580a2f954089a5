//! Download error types.

use thiserror::Error;

/// Why a download failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// The server reported the resource does not exist (404 or 410).
    #[error("not found: {url}")]
    NotFound {
        /// URL that was requested.
        url: String,
    },

    /// The server failed (5xx).
    #[error("server error: HTTP {status}")]
    ServerError {
        /// Response status.
        status: u16,
    },

    /// Any other status outside the 2xx range.
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus {
        /// Response status.
        status: u16,
    },

    /// The connection failed, closed early, or stalled.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The response body exceeds the configured limit.
    #[error("response exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: u64,
    },

    /// Too many redirects were followed.
    #[error("more than {limit} redirects")]
    TooManyRedirects {
        /// Configured limit.
        limit: u32,
    },

    /// The server's response could not be parsed.
    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),

    /// No transport is available for the URL scheme.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

impl DownloadError {
    /// Whether trying again later could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::ServerError { .. })
    }
}

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors raised by a [`Connector`](crate::Connector) when opening a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connector does not handle this scheme.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The URL has no usable host or port.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The connection could not be started.
    #[error("connect failed: {0}")]
    Connect(String),
}

impl From<TransportError> for DownloadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::UnsupportedScheme(scheme) => Self::UnsupportedScheme(scheme),
            TransportError::InvalidTarget(msg) | TransportError::Connect(msg) => {
                Self::NetworkFailure(msg)
            },
        }
    }
}
