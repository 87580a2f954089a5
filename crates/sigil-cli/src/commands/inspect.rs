//! Inspect command: show what a package contains and how it verifies.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sigil_approval::ApprovalStore;
use sigil_config::ResolvedConfig;
use sigil_crypto::Certificate;
use sigil_package::{PayloadEntry, SignatureStatus};
use sigil_trust::TrustClassifier;

use crate::config_bridge;
use crate::theme::Theme;

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn describe_certificate(index: usize, cert: &Certificate) -> String {
    let role = if index == 0 {
        "leaf"
    } else if cert.is_ca() {
        "ca"
    } else {
        "cert"
    };
    format!(
        "  [{index}] {} ({role})\n      issuer: {}\n      key id: {}\n      valid:  {} .. {}",
        display_name(&cert.common_name()),
        display_name(&cert.issuer_name()),
        hex::encode(cert.key_id()),
        format_time(cert.not_before()),
        format_time(cert.not_after()),
    )
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "(no common name)" } else { name }
}

fn signature_label(status: SignatureStatus) -> String {
    match status {
        SignatureStatus::Valid => Theme::success("content signature valid"),
        SignatureStatus::Unsigned => Theme::warning("unsigned"),
        SignatureStatus::Mismatch => {
            Theme::error("content signature does not match; chain discarded")
        },
    }
}

/// Print header, chain, verdict, manifest and entries of a package file.
pub(crate) fn inspect_package(resolved: &ResolvedConfig, path: &Path, offset: u64) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut package = sigil_package::open_at(file, offset)
        .with_context(|| format!("{} is not a readable package", path.display()))?;

    let (major, minor) = package.version();
    println!("\n{}", Theme::header(&format!("Package {}", path.display())));
    println!("  {}", Theme::kv("Format", &format!("{major}.{minor}")));
    println!(
        "  {}",
        Theme::kv("Created", &format_time(i64::from(package.timestamp())))
    );
    println!(
        "  {}",
        Theme::kv("Body", &format!("{} bytes", package.body_len()))
    );
    println!(
        "  {}",
        Theme::kv("Signature", &signature_label(package.signature_status()))
    );

    let chain = package.certificate_chain().clone();
    println!("\n{}", Theme::header("Certificate chain"));
    if chain.is_empty() {
        println!("  {}", Theme::dimmed("(empty)"));
    }
    for (index, cert) in chain.iter().enumerate() {
        println!("{}", describe_certificate(index, cert));
    }

    let store = config_bridge::trust_store(resolved)?;
    let classification = TrustClassifier::new(Arc::new(store)).evaluate(&chain);
    println!("\n{}", Theme::header("Trust"));
    println!(
        "  {}",
        Theme::kv("Verdict", &Theme::verdict(classification.verdict))
    );
    if let Some(code) = classification.code {
        println!("  {}", Theme::kv("Reason", &code.to_string()));
    }
    println!(
        "  {}",
        Theme::kv("Signer", display_name(&classification.signer_name))
    );

    let approvals = ApprovalStore::load(config_bridge::approvals_path(resolved))?;
    let remembered = !classification.signer_name.is_empty()
        && approvals
            .covering(&classification.signer_name, classification.verdict)
            .is_some();
    println!(
        "  {}",
        Theme::kv(
            "Remembered approval",
            if remembered { "yes" } else { "no" }
        )
    );

    if let Some(manifest) = package.manifest()? {
        println!("\n{}", Theme::header("Manifest"));
        println!(
            "  {}",
            Theme::kv(
                "Name",
                &format!("{} {}", manifest.display_name(), manifest.package.version)
            )
        );
        if let Some(description) = &manifest.package.description {
            println!("  {}", Theme::kv("About", description));
        }
        println!("  {}", Theme::kv("Entrypoint", &manifest.launch.entrypoint));
    }

    let entries: Vec<PayloadEntry> = package.payload_entries().collect::<Result<_, _>>()?;
    println!(
        "\n{}",
        Theme::header(&format!("Entries ({})", package.entry_count()))
    );
    for entry in &entries {
        println!("  {:>10}  {}", entry.size, entry.name);
    }
    println!();

    Ok(())
}
