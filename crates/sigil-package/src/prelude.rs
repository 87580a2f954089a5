//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sigil_package::prelude::*;` to import all essential types.

pub use crate::{PackageError, PackageResult};

pub use crate::{PackageHandle, PayloadEntry, SignatureStatus, open, open_at};

pub use crate::{PackageManifest, PackageWriter};
