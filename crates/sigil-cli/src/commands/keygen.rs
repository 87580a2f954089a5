//! Keygen command: create a signing key and a certificate for it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sigil_crypto::{Certificate, CertificateBuilder, KeyPair};

use crate::theme::Theme;

const SECONDS_PER_DAY: i64 = 86_400;

/// Options for `sigil keygen`.
#[derive(Debug, Clone)]
pub(crate) struct KeygenOptions {
    pub(crate) name: String,
    pub(crate) key: PathBuf,
    pub(crate) cert: PathBuf,
    pub(crate) ca: bool,
    pub(crate) days: u32,
    pub(crate) issuer_key: Option<PathBuf>,
    pub(crate) issuer_cert: Option<PathBuf>,
}

fn read_single_certificate(path: &Path) -> Result<Certificate> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut certs = Certificate::parse_armored(&text)?;
    if certs.len() != 1 {
        bail!(
            "{} holds {} certificates, expected one",
            path.display(),
            certs.len()
        );
    }
    Ok(certs.remove(0))
}

fn validity(days: u32) -> (i64, i64) {
    let now = chrono::Utc::now().timestamp();
    let span = i64::from(days).saturating_mul(SECONDS_PER_DAY);
    (now, now.saturating_add(span))
}

/// Issue a certificate for `key` according to `opts`.
fn issue(key: &KeyPair, opts: &KeygenOptions) -> Result<Certificate> {
    let (not_before, not_after) = validity(opts.days);
    let builder = CertificateBuilder::new(&opts.name)
        .ca(opts.ca)
        .validity(not_before, not_after);

    match (&opts.issuer_key, &opts.issuer_cert) {
        (None, None) => Ok(builder.self_signed(key)),
        (Some(issuer_key), Some(issuer_cert)) => {
            if !issuer_key.exists() {
                bail!("issuer key {} does not exist", issuer_key.display());
            }
            let issuer_key = KeyPair::load_or_generate(issuer_key)?;
            let issuer = read_single_certificate(issuer_cert)?;
            if !issuer.is_ca() {
                bail!("{} is not a CA certificate", issuer.common_name());
            }
            if issuer.key_id() != issuer_key.key_id() {
                bail!("issuer key does not match {}", issuer.common_name());
            }
            Ok(builder.issued_by(&key.export_public_key(), &issuer, &issuer_key))
        },
        _ => bail!("--issuer-key and --issuer-cert must be given together"),
    }
}

/// Create or reuse the key at `opts.key` and write its certificate.
pub(crate) fn generate(opts: &KeygenOptions) -> Result<()> {
    let existed = opts.key.exists();
    let key = KeyPair::load_or_generate(&opts.key)
        .with_context(|| format!("failed to prepare key {}", opts.key.display()))?;
    let cert = issue(&key, opts)?;

    if let Some(parent) = opts.cert.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&opts.cert, cert.to_armored())
        .with_context(|| format!("failed to write {}", opts.cert.display()))?;

    let key_note = if existed { "reused" } else { "generated" };
    println!(
        "{}",
        Theme::success(&format!("Certificate issued for {}", opts.name))
    );
    println!(
        "  {}",
        Theme::kv("Key", &format!("{} ({key_note})", opts.key.display()))
    );
    println!("  {}", Theme::kv("Key id", &key.key_id_hex()));
    println!("  {}", Theme::kv("Certificate", &opts.cert.display().to_string()));
    println!(
        "  {}",
        Theme::kv("Issuer", &cert.issuer_name())
    );
    Ok(())
}
