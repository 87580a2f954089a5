//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sigil_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{RuntimeError, RuntimeResult};

// Manager
pub use crate::InstanceManager;

// Instances
pub use crate::{
    FailureReason, InstanceEvent, InstanceId, InstanceState, InstanceStatus, PackageSource,
    StreamResult,
};

// Application runtime
pub use crate::{AppRuntime, ExitNotifier, LaunchRequest, PackagePayload, ProcessHandle, ProcessRuntime};
