//! Sigil Download - A cooperative, poll-driven HTTP fetcher.
//!
//! The [`DownloadEngine`] never blocks. The host calls
//! [`poll`](DownloadEngine::poll) once per tick; each call makes at most one
//! non-blocking read (or write, while the request is still being sent) per
//! active request and reports each finished request exactly once.
//!
//! Sockets, TLS and name resolution are not implemented here. They come in
//! through the [`Connector`] and [`Transport`] traits; [`TokioConnector`] is
//! a plain-HTTP implementation on top of tokio's non-blocking TCP streams.
//!
//! # Request lifecycle
//!
//! ```text
//! Connecting ──(request sent)──▶ Transferring ──(body complete)──▶ Complete
//!      │                              │
//!      └──────────(error)─────────────┴──────────▶ Failed
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod engine;
mod error;
mod http;
mod request;
mod tcp;
mod transport;

pub use engine::{DownloadEngine, DownloadEvent, DownloadResponse, EngineConfig};
pub use error::{DownloadError, DownloadResult, TransportError};
pub use http::ResponseHead;
pub use request::{DownloadHandle, DownloadProgress, DownloadRequest, RequestId};
pub use tcp::TokioConnector;
pub use transport::{Connector, ReadOutcome, Transport, WriteOutcome};
