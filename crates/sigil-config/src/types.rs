//! Configuration types for the Sigil runtime.
//!
//! The types here carry no dependency on the other sigil crates. The CLI
//! converts them into engine and manager settings at startup. Every struct
//! implements [`Default`] with the same values as `defaults.toml`, so a bare
//! `[section]` header produces a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the Sigil runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download engine limits.
    pub download: DownloadSection,
    /// Trust roots and approval persistence.
    pub trust: TrustSection,
    /// Instance manager pacing and extraction directory.
    pub runtime: RuntimeSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// DownloadSection
// ---------------------------------------------------------------------------

/// Download engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    /// `User-Agent` header value. `None` uses the engine's built-in value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Largest package body accepted, in bytes.
    pub max_package_bytes: u64,
    /// Seconds without progress before a request fails. `0` disables the
    /// idle timeout.
    pub idle_timeout_secs: u64,
    /// Redirects followed per request.
    pub max_redirects: u32,
    /// Bytes read from a transport per poll.
    pub read_chunk_bytes: usize,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            user_agent: None,
            max_package_bytes: 536_870_912,
            idle_timeout_secs: 30,
            max_redirects: 5,
            read_chunk_bytes: 16_384,
        }
    }
}

// ---------------------------------------------------------------------------
// TrustSection
// ---------------------------------------------------------------------------

/// Trust roots and approval policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSection {
    /// Directory of armored root certificates. Relative to the sigil home
    /// directory unless absolute.
    pub roots_dir: PathBuf,
    /// JSON file holding remembered approvals. Relative to the sigil home
    /// directory unless absolute.
    pub approvals_file: PathBuf,
    /// Approve fully verified packages without asking.
    pub auto_approve_verified: bool,
}

impl Default for TrustSection {
    fn default() -> Self {
        Self {
            roots_dir: PathBuf::from("roots"),
            approvals_file: PathBuf::from("approvals.json"),
            auto_approve_verified: true,
        }
    }
}

impl TrustSection {
    /// Roots directory resolved against `home`.
    #[must_use]
    pub fn roots_dir_in(&self, home: &Path) -> PathBuf {
        resolve(home, &self.roots_dir)
    }

    /// Approvals file resolved against `home`.
    #[must_use]
    pub fn approvals_file_in(&self, home: &Path) -> PathBuf {
        resolve(home, &self.approvals_file)
    }
}

fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

// ---------------------------------------------------------------------------
// RuntimeSection
// ---------------------------------------------------------------------------

/// Instance manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Milliseconds between manager ticks.
    pub tick_interval_ms: u64,
    /// Parent directory for extracted packages. `None` uses the system
    /// temporary directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            work_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["sigil_download=trace"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
