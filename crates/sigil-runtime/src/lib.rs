//! Sigil Runtime - Lifecycle management for package instances.
//!
//! The [`InstanceManager`] owns every live instance and moves each one
//! through its state machine, one transition per [`tick`](InstanceManager::tick):
//!
//! ```text
//! Created ─▶ (Downloading) ─▶ Verifying ─▶ (AwaitingApproval) ─▶ Running ─▶ Stopped
//!                 │               │                │
//!                 └───────────────┴────────────────┴──────▶ Failed
//! ```
//!
//! Collaborators are injected: a [`DownloadEngine`](sigil_download::DownloadEngine)
//! for remote packages, a [`TrustClassifier`](sigil_trust::TrustClassifier),
//! a [`TrustDecisionSurface`](sigil_approval::TrustDecisionSurface) for
//! prompts, and an [`AppRuntime`] that actually runs the payload.
//!
//! No instance reaches `Running` without an
//! [`ApprovalRecord`](sigil_approval::ApprovalRecord) that authorizes it, and
//! no payload byte reaches the [`AppRuntime`] before verification.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod app;
mod error;
mod instance;
mod manager;
mod process;

pub use app::{AppRuntime, ExitNotifier, LaunchRequest, PackagePayload, ProcessHandle};
pub use error::{RuntimeError, RuntimeResult};
pub use instance::{
    FailureReason, InstanceEvent, InstanceId, InstanceState, InstanceStatus, PackageSource,
    StreamResult,
};
pub use manager::{InstanceManager, MAX_HISTORY, MAX_PENDING_EVENTS};
pub use process::ProcessRuntime;
