//! Validation of a fully merged [`Config`].

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest redirect chain a configuration may allow.
pub const MAX_REDIRECT_LIMIT: u32 = 20;

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_download(config)?;
    validate_runtime(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_download(config: &Config) -> ConfigResult<()> {
    let download = &config.download;
    if download.max_package_bytes == 0 {
        return Err(invalid(
            "download.max_package_bytes",
            "package limit must be greater than zero",
        ));
    }
    if download.read_chunk_bytes == 0 {
        return Err(invalid(
            "download.read_chunk_bytes",
            "read chunk size must be greater than zero",
        ));
    }
    if download.max_redirects > MAX_REDIRECT_LIMIT {
        return Err(invalid(
            "download.max_redirects",
            format!(
                "{} redirects exceeds the limit of {MAX_REDIRECT_LIMIT}",
                download.max_redirects
            ),
        ));
    }
    if download
        .user_agent
        .as_deref()
        .is_some_and(|ua| ua.trim().is_empty() || ua.contains(['\r', '\n']))
    {
        return Err(invalid(
            "download.user_agent",
            "user agent must be a non-empty single line",
        ));
    }
    Ok(())
}

fn validate_runtime(config: &Config) -> ConfigResult<()> {
    if config.runtime.tick_interval_ms == 0 {
        return Err(invalid(
            "runtime.tick_interval_ms",
            "tick interval must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}
