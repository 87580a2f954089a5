//! `SIGIL_*` environment variable overrides.
//!
//! Environment variables sit above every file layer: a set variable wins
//! over any config file value for the same field.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// TOML type a variable is coerced to.
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    String,
    Integer,
    Boolean,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: FieldKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "SIGIL_USER_AGENT",
        field_path: "download.user_agent",
        kind: FieldKind::String,
    },
    EnvMapping {
        var_name: "SIGIL_MAX_PACKAGE_BYTES",
        field_path: "download.max_package_bytes",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "SIGIL_IDLE_TIMEOUT_SECS",
        field_path: "download.idle_timeout_secs",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "SIGIL_MAX_REDIRECTS",
        field_path: "download.max_redirects",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "SIGIL_ROOTS_DIR",
        field_path: "trust.roots_dir",
        kind: FieldKind::String,
    },
    EnvMapping {
        var_name: "SIGIL_APPROVALS_FILE",
        field_path: "trust.approvals_file",
        kind: FieldKind::String,
    },
    EnvMapping {
        var_name: "SIGIL_AUTO_APPROVE_VERIFIED",
        field_path: "trust.auto_approve_verified",
        kind: FieldKind::Boolean,
    },
    EnvMapping {
        var_name: "SIGIL_TICK_INTERVAL_MS",
        field_path: "runtime.tick_interval_ms",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "SIGIL_WORK_DIR",
        field_path: "runtime.work_dir",
        kind: FieldKind::String,
    },
    EnvMapping {
        var_name: "SIGIL_LOG_LEVEL",
        field_path: "logging.level",
        kind: FieldKind::String,
    },
    EnvMapping {
        var_name: "SIGIL_LOG_FORMAT",
        field_path: "logging.format",
        kind: FieldKind::String,
    },
];

/// Apply every known `SIGIL_*` variable present in `env_vars` on top of
/// `merged`.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] when a numeric or boolean variable does
/// not parse.
pub fn apply_env_overrides<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        let value = coerce(mapping, raw)?;
        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var override"
        );
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let raw = raw.trim();
    match mapping.kind {
        FieldKind::String => Ok(toml::Value::String(raw.to_owned())),
        FieldKind::Integer => raw
            .parse::<i64>()
            .ok()
            .filter(|v| *v >= 0)
            .map(toml::Value::Integer)
            .ok_or_else(|| ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected a non-negative integer, got '{raw}'"),
            }),
        FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected a boolean, got '{raw}'"),
            }),
        },
    }
}

/// Set a dotted `path` in the TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        let child = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if !child.is_table() {
            *child = toml::Value::Table(toml::map::Map::new());
        }
        current = child;
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
