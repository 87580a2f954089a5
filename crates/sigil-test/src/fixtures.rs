//! Fixtures: a throwaway PKI, sample packages, and canned HTTP responses.

use std::io::Write;
use std::sync::{Arc, Once};

use sigil_crypto::{Certificate, CertificateBuilder, CertificateChain, Ed25519TrustStore, KeyPair};
use sigil_package::PackageWriter;

/// Timestamp written into every fixture package.
pub const FIXTURE_TIMESTAMP: u32 = 1_700_000_000;

/// Sample program stored in fixture packages.
pub const FIXTURE_PROGRAM: &[u8] = b"#!/bin/sh\necho \"hello from sigil\"\n";

/// A root CA plus helpers for issuing signed packages under it.
pub struct TestPki {
    root_key: KeyPair,
    root: Certificate,
}

impl std::fmt::Debug for TestPki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPki")
            .field("root", &self.root.common_name())
            .finish_non_exhaustive()
    }
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPki {
    /// Generate a fresh root named "Sigil Test Root".
    #[must_use]
    pub fn new() -> Self {
        let root_key = KeyPair::generate();
        let root = CertificateBuilder::new("Sigil Test Root")
            .ca(true)
            .self_signed(&root_key);
        Self { root_key, root }
    }

    /// The root certificate.
    #[must_use]
    pub fn root(&self) -> &Certificate {
        &self.root
    }

    /// A trust store anchored on this root only.
    #[must_use]
    pub fn store(&self) -> Arc<Ed25519TrustStore> {
        let mut store = Ed25519TrustStore::new();
        store.add_root(self.root.clone());
        Arc::new(store)
    }

    /// Issue a leaf for `signer` through `intermediates` CA certificates.
    ///
    /// Returns the leaf key and the chain in leaf-first order. The root is
    /// not part of the chain.
    #[must_use]
    pub fn issue_chain(&self, signer: &str, intermediates: usize) -> (KeyPair, CertificateChain) {
        let mut cas: Vec<(KeyPair, Certificate)> = Vec::with_capacity(intermediates);
        for depth in 0..intermediates {
            let key = KeyPair::generate();
            let (issuer_key, issuer) = cas
                .last()
                .map_or((&self.root_key, &self.root), |(k, c)| (k, c));
            let cert = CertificateBuilder::new(&format!("Sigil Test CA {depth}"))
                .ca(true)
                .issued_by(&key.export_public_key(), issuer, issuer_key);
            cas.push((key, cert));
        }

        let leaf_key = KeyPair::generate();
        let (issuer_key, issuer) = cas
            .last()
            .map_or((&self.root_key, &self.root), |(k, c)| (k, c));
        let leaf = CertificateBuilder::new(signer).issued_by(
            &leaf_key.export_public_key(),
            issuer,
            issuer_key,
        );

        let mut certs = vec![leaf];
        certs.extend(cas.into_iter().rev().map(|(_, cert)| cert));
        (leaf_key, CertificateChain::new(certs))
    }

    /// A package signed by `signer` through `intermediates` CAs.
    ///
    /// # Panics
    ///
    /// Panics if the package cannot be written.
    #[must_use]
    pub fn signed_package(&self, signer: &str, intermediates: usize) -> Vec<u8> {
        let (key, chain) = self.issue_chain(signer, intermediates);
        sample_writer()
            .finish_signed(&key, &chain)
            .expect("fixture package should sign")
    }
}

/// A package signed directly under `pki`'s root.
#[must_use]
pub fn signed_package(pki: &TestPki, signer: &str) -> Vec<u8> {
    pki.signed_package(signer, 0)
}

/// A package signed by a self-signed certificate for `signer`.
///
/// # Panics
///
/// Panics if the package cannot be written.
#[must_use]
pub fn self_signed_package(signer: &str) -> Vec<u8> {
    let key = KeyPair::generate();
    let cert = CertificateBuilder::new(signer).self_signed(&key);
    sample_writer()
        .finish_signed(&key, &CertificateChain::new(vec![cert]))
        .expect("fixture package should sign")
}

/// A package with an empty certificate chain.
///
/// # Panics
///
/// Panics if the package cannot be written.
#[must_use]
pub fn unsigned_package() -> Vec<u8> {
    sample_writer()
        .finish()
        .expect("fixture package should build")
}

/// Writer preloaded with a manifest and a small shell program.
#[must_use]
pub fn sample_writer() -> PackageWriter {
    let manifest = "[package]\nname = \"hello\"\nversion = \"1.0.0\"\n\n[launch]\nentrypoint = \"bin/hello\"\n";
    PackageWriter::new()
        .timestamp(FIXTURE_TIMESTAMP)
        .add_entry(sigil_package::MANIFEST_ENTRY, manifest.as_bytes().to_vec())
        .add_entry("bin/hello", FIXTURE_PROGRAM.to_vec())
}

/// Write `bytes` to a fresh temporary file.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_package(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(bytes).expect("write fixture package");
    file.flush().expect("flush fixture package");
    file
}

/// `200 OK` response carrying `body` with a `Content-Length`.
#[must_use]
pub fn http_ok(body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// Empty-bodied response with the given status line.
#[must_use]
pub fn http_status(status: u16, reason: &str) -> Vec<u8> {
    format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\n\r\n").into_bytes()
}

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
