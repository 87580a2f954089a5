//! Sigil Telemetry - Logging setup for the Sigil package runtime.
//!
//! Every sigil crate logs through `tracing` with structured fields. This
//! crate installs the global subscriber: an [`EnvFilter`](tracing_subscriber::EnvFilter)
//! built from a level plus per-crate directives, and one `fmt` layer in the
//! chosen [`LogFormat`] writing to stdout, stderr or a rolling file.
//!
//! # Example
//!
//! ```rust,no_run
//! use sigil_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), sigil_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("sigil_download=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
