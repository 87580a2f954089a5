//! Config file discovery and layered loading.
//!
//! `Config::load()` runs these steps:
//! 1. Parse `defaults.toml` into the base tree
//! 2. Merge `/etc/sigil/config.toml` (system)
//! 3. Merge `{sigil home}/config.toml` (user)
//! 4. Merge the file named on the command line, if any
//! 5. Apply `SIGIL_*` environment overrides
//! 6. Deserialize the merged tree into `Config`
//! 7. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// System-wide configuration file.
const SYSTEM_CONFIG_PATH: &str = "/etc/sigil/config.toml";

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A loaded configuration together with where its values came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Layer that set each dotted field path.
    pub field_sources: FieldSources,
    /// Files merged, in order.
    pub loaded_files: Vec<String>,
    /// Sigil home directory. Relative paths in `[trust]` resolve here.
    pub home: PathBuf,
}

/// Locations consulted by [`load_layers`].
#[derive(Debug, Clone)]
pub(crate) struct LayerPaths {
    pub(crate) system: PathBuf,
    pub(crate) home: PathBuf,
    pub(crate) explicit: Option<PathBuf>,
}

/// Load the configuration with layered file precedence.
///
/// `explicit` names a file given on the command line; unlike the other
/// layers it must exist. `home_override` replaces the sigil home directory
/// (normally `$SIGIL_HOME` or `~/.sigil`).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or malformed,
/// an environment override does not parse, or the merged configuration fails
/// validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => sigil_home(&env_vars)?,
    };

    let paths = LayerPaths {
        system: PathBuf::from(SYSTEM_CONFIG_PATH),
        home,
        explicit: explicit.map(Path::to_path_buf),
    };
    load_layers(&paths, &env_vars)
}

pub(crate) fn load_layers<S: ::std::hash::BuildHasher>(
    paths: &LayerPaths,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    // 2-3. System and user files, both optional.
    let optional = [
        (paths.system.clone(), ConfigLayer::System),
        (paths.home.join("config.toml"), ConfigLayer::User),
    ];
    for (path, layer) in optional {
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
            info!(path = %path.display(), layer = %layer, "loaded config file");
            loaded_files.push(path.display().to_string());
        }
    }

    // 4. Explicit file, required.
    if let Some(path) = &paths.explicit {
        let overlay = read_toml(path)?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::Explicit,
            &mut field_sources,
        );
        info!(path = %path.display(), "loaded explicit config");
        loaded_files.push(path.display().to_string());
    }

    // 5. Environment overrides.
    let env_count = apply_env_overrides(&mut merged, &mut field_sources, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment overrides");
    }

    // 6-7. Deserialize and validate.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
        home: paths.home.clone(),
    })
}

/// Load a config from a specific file path (no layering).
///
/// Keys the file omits take their default values.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = read_toml(path)?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    match read_toml(path) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

/// Read and parse one TOML file, enforcing the size cap.
///
/// Size is checked after a single read so there is no window between a stat
/// and the read.
fn read_toml(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len(),
            ),
        });
    }

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Resolve the sigil home directory: a valid `$SIGIL_HOME`, else
/// `~/.sigil`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDir`] if no user home directory exists.
pub fn sigil_home<S: ::std::hash::BuildHasher>(
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<PathBuf> {
    let home_dir = home_directory()?;
    if let Some(raw) = env_vars.get("SIGIL_HOME") {
        if let Some(canonical) = validate_sigil_home(raw, &home_dir) {
            return Ok(canonical);
        }
        warn!(
            path = raw.as_str(),
            "SIGIL_HOME is not a valid directory owned by current user; ignoring"
        );
    }
    Ok(home_dir.join(".sigil"))
}

/// Check that `SIGIL_HOME` is a real directory owned by the same user who
/// owns `home_dir`. Returns the canonicalized path on success.
fn validate_sigil_home(raw_path: &str, home_dir: &Path) -> Option<PathBuf> {
    let canonical = PathBuf::from(raw_path).canonicalize().ok()?;

    if !canonical.is_dir() {
        return None;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let dir_uid = canonical.metadata().ok()?.uid();
        let home_uid = home_dir.metadata().ok()?.uid();
        if dir_uid != home_uid {
            return None;
        }
    }

    #[cfg(not(unix))]
    let _ = home_dir;

    Some(canonical)
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
