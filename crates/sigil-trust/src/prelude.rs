//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sigil_trust::prelude::*;` to import all essential types.

pub use crate::{Classification, TrustClassifier, VerifyVerdict};
