//! Sigil Test - Shared test utilities for the Sigil package runtime.
//!
//! Mock collaborators and fixtures used as a dev-dependency by the
//! integration tests and the CLI.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! sigil-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use sigil_test::{RecordingSurface, TestPki};
//! use sigil_approval::Decision;
//!
//! let pki = TestPki::new();
//! let package = pki.signed_package("Example Signer", 0);
//! let surface = RecordingSurface::new().with_decision(Decision::Approve);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
