//! Conversion from `sigil_config` types to runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use sigil_config::{Config, DownloadSection, ResolvedConfig};
use sigil_crypto::Ed25519TrustStore;
use sigil_download::EngineConfig;
use sigil_telemetry::LogConfig;

/// Engine settings from the `[download]` section.
pub(crate) fn engine_config(section: &DownloadSection) -> EngineConfig {
    let defaults = EngineConfig::default();
    EngineConfig {
        user_agent: section.user_agent.clone().unwrap_or(defaults.user_agent),
        max_body_bytes: section.max_package_bytes,
        idle_timeout: (section.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(section.idle_timeout_secs)),
        max_redirects: section.max_redirects,
        read_chunk_bytes: section.read_chunk_bytes,
    }
}

/// Log settings from the `[logging]` section; `verbose` forces `debug`.
pub(crate) fn log_config(config: &Config, verbose: bool) -> LogConfig {
    let log = LogConfig::from_section(&config.logging).unwrap_or_default();
    if verbose { log.with_level("debug") } else { log }
}

/// Approvals file location.
pub(crate) fn approvals_path(resolved: &ResolvedConfig) -> PathBuf {
    resolved
        .config
        .trust
        .approvals_file_in(&resolved.home)
}

/// Trust roots directory location.
pub(crate) fn roots_dir(resolved: &ResolvedConfig) -> PathBuf {
    resolved.config.trust.roots_dir_in(&resolved.home)
}

/// Trust store loaded from the configured roots directory.
pub(crate) fn trust_store(resolved: &ResolvedConfig) -> anyhow::Result<Ed25519TrustStore> {
    let dir = roots_dir(resolved);
    let mut store = Ed25519TrustStore::new();
    let added = store.load_roots_dir(&dir)?;
    tracing::debug!(dir = %dir.display(), roots = added, "loaded trust roots");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_mapping() {
        let section = DownloadSection {
            user_agent: Some("custom/1".to_owned()),
            max_package_bytes: 1024,
            idle_timeout_secs: 0,
            max_redirects: 2,
            read_chunk_bytes: 512,
        };
        let engine = engine_config(&section);
        assert_eq!(engine.user_agent, "custom/1");
        assert_eq!(engine.max_body_bytes, 1024);
        assert_eq!(engine.idle_timeout, None);
        assert_eq!(engine.max_redirects, 2);
        assert_eq!(engine.read_chunk_bytes, 512);
    }

    #[test]
    fn test_engine_config_defaults_user_agent() {
        let engine = engine_config(&DownloadSection::default());
        assert_eq!(engine.user_agent, EngineConfig::default().user_agent);
        assert_eq!(engine.idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_verbose_forces_debug() {
        let config = Config::default();
        assert_eq!(log_config(&config, false).level, "info");
        assert_eq!(log_config(&config, true).level, "debug");
    }
}
