//! Sigil Package - Signed, content-addressed application packages.
//!
//! A package is a binary container holding:
//! - a header identifying the format version
//! - an embedded certificate chain with a signature over the contents
//!   (empty for unsigned packages)
//! - a table of contents mapping entry names to byte ranges
//! - the entry data
//!
//! [`open`] reads the header and certificate chain once and checks the
//! signature by streaming the body through a hasher. Entries are then listed
//! lazily, so a caller can decide whether to trust a package before touching
//! its payload.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use sigil_package::PackageWriter;
//!
//! let bytes = PackageWriter::new()
//!     .add_entry("main.py", b"print('hi')".to_vec())
//!     .finish()
//!     .unwrap();
//!
//! let mut package = sigil_package::open(Cursor::new(bytes)).unwrap();
//! assert!(package.certificate_chain().is_empty());
//!
//! let entries: Vec<_> = package.payload_entries().collect::<Result<_, _>>().unwrap();
//! assert_eq!(entries[0].name, "main.py");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod format;
pub mod prelude;

mod entry;
mod error;
mod manifest;
mod reader;
mod writer;

pub use entry::PayloadEntry;
pub use error::{PackageError, PackageResult};
pub use manifest::{LaunchDef, MANIFEST_ENTRY, PackageInfo, PackageManifest};
pub use reader::{PackageHandle, PayloadEntries, SignatureStatus, open, open_at};
pub use writer::PackageWriter;
