//! Package manifest (`package.toml`).
//!
//! Optional entry describing what the package is and how to launch it.

use serde::{Deserialize, Serialize};

use crate::error::{PackageError, PackageResult};

/// Entry name the manifest is stored under.
pub const MANIFEST_ENTRY: &str = "package.toml";

/// Parsed `package.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Identity of the package.
    pub package: PackageInfo,
    /// How to start it.
    pub launch: LaunchDef,
}

/// Package identity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Short machine name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Name shown to people.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// One-line description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Launch definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDef {
    /// Entry name of the program to run.
    pub entrypoint: String,
    /// Arguments passed before any host-supplied ones.
    #[serde(default)]
    pub args: Vec<String>,
}

impl PackageManifest {
    /// Parse and validate manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidManifest`] for TOML errors, an empty
    /// name, or an entrypoint that is not a plain relative path.
    pub fn parse(text: &str) -> PackageResult<Self> {
        let manifest: Self =
            toml::from_str(text).map_err(|e| PackageError::InvalidManifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidManifest`] if serialization fails.
    pub fn to_toml_string(&self) -> PackageResult<String> {
        toml::to_string_pretty(self).map_err(|e| PackageError::InvalidManifest(e.to_string()))
    }

    /// Name to show for this package.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.package
            .display_name
            .as_deref()
            .unwrap_or(&self.package.name)
    }

    fn validate(&self) -> PackageResult<()> {
        if self.package.name.trim().is_empty() {
            return Err(PackageError::InvalidManifest("package.name is empty".into()));
        }
        let entry = crate::PayloadEntry {
            name: self.launch.entrypoint.clone(),
            offset: 0,
            size: 0,
        };
        if entry.relative_path().is_none() {
            return Err(PackageError::InvalidManifest(format!(
                "launch.entrypoint {:?} is not a relative entry name",
                self.launch.entrypoint
            )));
        }
        Ok(())
    }
}
