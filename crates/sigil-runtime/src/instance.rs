//! Instance identity, states and status snapshots.

use std::fmt;
use std::path::PathBuf;

use sigil_approval::ApprovalRecord;
use sigil_download::{DownloadError, DownloadProgress};
use sigil_trust::VerifyVerdict;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Unique identifier of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Fresh random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an instance's package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Fetched through the download engine.
    Url(Url),
    /// A file on disk; the package starts `offset` bytes in.
    Local {
        /// File path.
        path: PathBuf,
        /// Byte offset of the package within the file.
        offset: u64,
    },
    /// Bytes pushed by the host with
    /// [`feed_stream`](crate::InstanceManager::feed_stream).
    Stream,
}

impl PackageSource {
    /// A local package at the start of `path`.
    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local {
            path: path.into(),
            offset: 0,
        }
    }

    /// Whether the package arrives over the network or a host stream.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local { .. })
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Local { path, offset: 0 } => write!(f, "{}", path.display()),
            Self::Local { path, offset } => write!(f, "{}@{offset}", path.display()),
            Self::Stream => f.write_str("<stream>"),
        }
    }
}

/// How a host stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamResult {
    /// All bytes were delivered.
    Complete,
    /// The stream broke.
    Failed(String),
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// Just created.
    Created,
    /// Waiting for package bytes.
    Downloading,
    /// Reading the package and classifying its signer.
    Verifying,
    /// Waiting for a person to approve the signer.
    AwaitingApproval,
    /// Handed to the application runtime.
    Running,
    /// The application exited or was torn down.
    Stopped,
    /// Terminal failure; see [`FailureReason`].
    Failed,
}

impl InstanceState {
    /// Whether no further transitions happen on their own.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// Why an instance ended in [`InstanceState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Fetching the package failed. The only retryable reason.
    #[error("download failed: {0}")]
    Network(DownloadError),

    /// The package is corrupt or unreadable.
    #[error("invalid package: {0}")]
    Container(String),

    /// A person declined to run the package.
    #[error("cancelled by user")]
    HumanCancelled,

    /// The instance was torn down while its prompt was pending.
    #[error("prompt dismissed")]
    Dismissed,

    /// The application runtime refused to start the payload.
    #[error("launch failed: {0}")]
    LaunchFailed(String),
}

impl FailureReason {
    /// Whether [`retry_instance`](crate::InstanceManager::retry_instance)
    /// accepts an instance that failed for this reason.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// A state change, queued for [`drain_events`](crate::InstanceManager::drain_events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    /// An instance moved from `from` to `to`.
    StateChanged {
        /// The instance.
        id: InstanceId,
        /// Previous state.
        from: InstanceState,
        /// New state.
        to: InstanceState,
    },
}

/// Point-in-time view of an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceStatus {
    /// The instance.
    pub id: InstanceId,
    /// Where the package comes from.
    pub source: PackageSource,
    /// Current state.
    pub state: InstanceState,
    /// Set when `state` is `Failed`.
    pub failure: Option<FailureReason>,
    /// Verdict, once verified.
    pub verdict: Option<VerifyVerdict>,
    /// Signer common name, once verified.
    pub signer: Option<String>,
    /// States entered, oldest first, starting with `Created`. Only the
    /// last [`MAX_HISTORY`](crate::MAX_HISTORY) are kept.
    pub history: Vec<InstanceState>,
    /// Download progress while `Downloading`.
    pub progress: Option<DownloadProgress>,
    /// Approval that authorized the launch.
    pub approval: Option<ApprovalRecord>,
    /// Exit code reported by the application runtime.
    pub exit_code: Option<i32>,
}

impl InstanceStatus {
    /// Whether `state` was ever entered.
    #[must_use]
    pub fn visited(&self, state: InstanceState) -> bool {
        self.history.contains(&state)
    }
}
