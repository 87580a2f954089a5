//! Sigil Approval - Remembering which signers a person has trusted.
//!
//! This crate provides:
//! - [`ApprovalRecord`]: a signer's approval and the verdict it was given under
//! - [`ApprovalStore`]: the per-manager map of records, with JSON persistence
//! - [`TrustDecisionSurface`]: the contract a platform implements to ask a
//!   person whether to run a package
//! - [`PolicySurface`]: a non-interactive surface driven by fixed policy
//!
//! # Coverage
//!
//! A stored record covers a later launch when the signer matches and the new
//! verdict is either the one the record was approved under or `Verified`.
//! Cancelled prompts are never stored. Unsigned packages are never stored,
//! since an empty signer name would otherwise cover every unsigned package.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod record;
mod store;
mod surface;

pub use error::{ApprovalError, ApprovalResult};
pub use record::ApprovalRecord;
pub use store::ApprovalStore;
pub use surface::{ApprovalPolicy, Decision, PolicySurface, TrustDecisionSurface};
