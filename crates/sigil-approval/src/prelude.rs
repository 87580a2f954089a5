//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sigil_approval::prelude::*;` to import all essential types.

// Errors
pub use crate::{ApprovalError, ApprovalResult};

// Records
pub use crate::{ApprovalRecord, ApprovalStore};

// Decision surfaces
pub use crate::{ApprovalPolicy, Decision, PolicySurface, TrustDecisionSurface};
