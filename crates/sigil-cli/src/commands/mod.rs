//! CLI commands.

pub(crate) mod approvals;
pub(crate) mod config;
pub(crate) mod inspect;
pub(crate) mod keygen;
pub(crate) mod pack;
pub(crate) mod run;
pub(crate) mod trust;
