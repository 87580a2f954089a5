//! Common re-exports for configuration consumers.
//!
//! ```rust
//! use sigil_config::prelude::*;
//! ```

// Errors
pub use crate::{ConfigError, ConfigResult};

// Loading
pub use crate::{ConfigLayer, FieldSources, ResolvedConfig};

// Sections
pub use crate::{Config, DownloadSection, LoggingSection, RuntimeSection, TrustSection};
