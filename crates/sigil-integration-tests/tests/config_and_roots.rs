//! Integration tests tying configuration, logging settings and the on-disk
//! trust roots together.

use std::sync::Arc;

use sigil_config::{Config, ConfigLayer};
use sigil_crypto::Ed25519TrustStore;
use sigil_package::open_at;
use sigil_telemetry::{LogConfig, LogFormat};
use sigil_test::TestPki;
use sigil_trust::{TrustClassifier, VerifyVerdict};

const USER_CONFIG: &str = r#"
[trust]
roots_dir = "certs"
auto_approve_verified = false

[download]
max_redirects = 2

[logging]
level = "debug"
format = "json"
"#;

#[test]
fn test_user_config_overrides_defaults() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.toml"), USER_CONFIG).unwrap();

    let resolved = Config::load_with_home(None, home.path()).unwrap();
    let config = &resolved.config;

    assert_eq!(config.download.max_redirects, 2);
    assert!(!config.trust.auto_approve_verified);
    assert_eq!(
        config.trust.roots_dir_in(&resolved.home),
        home.path().join("certs")
    );
    assert_eq!(
        config.trust.approvals_file_in(&resolved.home),
        home.path().join("approvals.json")
    );
    assert_eq!(
        resolved.field_sources.get("download.max_redirects"),
        Some(&ConfigLayer::User)
    );
    assert_eq!(
        resolved.field_sources.get("download.read_chunk_bytes"),
        Some(&ConfigLayer::Defaults)
    );
    assert!(
        resolved
            .loaded_files
            .iter()
            .any(|f| f.ends_with("config.toml"))
    );
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    let missing = home.path().join("nope.toml");
    assert!(Config::load_with_home(Some(&missing), home.path()).is_err());
}

#[test]
fn test_invalid_user_config_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join("config.toml"),
        "[download]\nread_chunk_bytes = 0\n",
    )
    .unwrap();
    assert!(Config::load_with_home(None, home.path()).is_err());
}

#[test]
fn test_logging_section_feeds_log_config() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.toml"), USER_CONFIG).unwrap();
    let resolved = Config::load_with_home(None, home.path()).unwrap();

    let log = LogConfig::from_section(&resolved.config.logging).unwrap();
    assert_eq!(log.level, "debug");
    assert_eq!(log.format, LogFormat::Json);
}

#[test]
fn test_roots_dir_drives_verification() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.toml"), USER_CONFIG).unwrap();
    let resolved = Config::load_with_home(None, home.path()).unwrap();
    let roots_dir = resolved.config.trust.roots_dir_in(&resolved.home);

    let pki = TestPki::new();
    let bytes = pki.signed_package("Example Corp", 1);
    let chain = open_at(std::io::Cursor::new(bytes), 0)
        .unwrap()
        .certificate_chain()
        .clone();

    // Nothing installed yet.
    let mut store = Ed25519TrustStore::new();
    assert_eq!(store.load_roots_dir(&roots_dir).unwrap(), 0);
    let classifier = TrustClassifier::new(Arc::new(store));
    assert_ne!(classifier.classify(&chain), VerifyVerdict::Verified);

    std::fs::create_dir_all(&roots_dir).unwrap();
    std::fs::write(roots_dir.join("test-root.pem"), pki.root().to_armored()).unwrap();

    let mut store = Ed25519TrustStore::new();
    assert_eq!(store.load_roots_dir(&roots_dir).unwrap(), 1);
    let classifier = TrustClassifier::new(Arc::new(store));
    assert_eq!(classifier.classify(&chain), VerifyVerdict::Verified);
}
