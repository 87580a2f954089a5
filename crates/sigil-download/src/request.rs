//! Download requests and handles.

use std::fmt;

use url::Url;

/// Identifier unique for the lifetime of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    /// Numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Handle returned by [`DownloadEngine::start`](crate::DownloadEngine::start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadHandle {
    pub(crate) id: RequestId,
}

impl DownloadHandle {
    /// The request this handle refers to.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }
}

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Target URL.
    pub url: Url,
    /// Request body; its presence makes the request a POST.
    pub body: Option<Vec<u8>>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl DownloadRequest {
    /// A GET request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            body: None,
            headers: Vec::new(),
        }
    }

    /// A POST request with `body`.
    #[must_use]
    pub fn post(url: Url, body: Vec<u8>) -> Self {
        Self {
            url,
            body: Some(body),
            headers: Vec::new(),
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Bytes received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Body bytes received.
    pub received: u64,
    /// Body length announced by the server, if any.
    pub expected: Option<u64>,
}

impl DownloadProgress {
    /// Completed fraction in `[0, 1]`, if the length is known.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        match self.expected {
            Some(0) => Some(1.0),
            Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}
