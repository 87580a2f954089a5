//! Prelude module - commonly used test utilities.
//!
//! Use `use sigil_test::prelude::*;` in test modules.

// Mocks
pub use crate::{
    CountingTrustStore, MockAppRuntime, RecordingSurface, ScriptStep, ScriptedConnector,
    ScriptedTransport,
};

// Fixtures
pub use crate::{
    TestPki, http_ok, http_status, init_test_logging, sample_writer, self_signed_package,
    signed_package, unsigned_package, write_package,
};
