//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sigil_download::prelude::*;` to import all essential types.

// Errors
pub use crate::{DownloadError, DownloadResult, TransportError};

// Engine
pub use crate::{DownloadEngine, DownloadEvent, DownloadResponse, EngineConfig};

// Requests
pub use crate::{DownloadHandle, DownloadProgress, DownloadRequest, RequestId};

// Transports
pub use crate::{Connector, ReadOutcome, TokioConnector, Transport, WriteOutcome};
