//! Pack command: build a package from a directory tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sigil_crypto::{Certificate, CertificateChain, KeyPair};
use sigil_package::{MANIFEST_ENTRY, PackageManifest, PackageWriter};

use crate::theme::Theme;

/// Options for `sigil pack`.
#[derive(Debug, Clone)]
pub(crate) struct PackOptions {
    pub(crate) dir: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) key: Option<PathBuf>,
    pub(crate) chain: Option<PathBuf>,
}

/// Collect regular files under `root` as (`/`-separated name, path), sorted
/// by name. Symlinks are skipped.
fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path.strip_prefix(root)?;
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((name, path));
            } else {
                tracing::debug!(path = %path.display(), "Skipping non-regular file");
            }
        }
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn load_chain(path: &Path) -> Result<CertificateChain> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let certs = Certificate::parse_armored(&text)?;
    if certs.is_empty() {
        bail!("{} holds no certificates", path.display());
    }
    Ok(CertificateChain::new(certs))
}

/// Build the package bytes described by `opts`.
fn build(opts: &PackOptions) -> Result<(Vec<u8>, PackageManifest, usize)> {
    let files = collect_files(&opts.dir)?;

    let manifest_path = files
        .iter()
        .find(|(name, _)| name == MANIFEST_ENTRY)
        .map(|(_, path)| path.clone())
        .with_context(|| format!("{} has no {MANIFEST_ENTRY}", opts.dir.display()))?;
    let manifest = PackageManifest::parse(&std::fs::read_to_string(&manifest_path)?)
        .with_context(|| format!("invalid {MANIFEST_ENTRY}"))?;
    if !files.iter().any(|(name, _)| *name == manifest.launch.entrypoint) {
        bail!(
            "entrypoint {} is not part of {}",
            manifest.launch.entrypoint,
            opts.dir.display()
        );
    }

    let count = files.len();
    let mut writer = PackageWriter::new();
    for (name, path) in files {
        let data =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        writer = writer.add_entry(name, data);
    }

    let bytes = match (&opts.key, &opts.chain) {
        (None, None) => writer.finish()?,
        (Some(key), Some(chain)) => {
            if !key.exists() {
                bail!("signing key {} does not exist", key.display());
            }
            let key = KeyPair::load_or_generate(key)?;
            let chain = load_chain(chain)?;
            writer.finish_signed(&key, &chain)?
        },
        _ => bail!("--key and --chain must be given together"),
    };
    Ok((bytes, manifest, count))
}

/// Build and write a package.
pub(crate) fn pack(opts: &PackOptions) -> Result<()> {
    let (bytes, manifest, count) = build(opts)?;
    std::fs::write(&opts.output, &bytes)
        .with_context(|| format!("failed to write {}", opts.output.display()))?;

    let signed = if opts.key.is_some() { "signed" } else { "unsigned" };
    println!(
        "{}",
        Theme::success(&format!(
            "Packed {} {} ({signed})",
            manifest.display_name(),
            manifest.package.version
        ))
    );
    println!("  {}", Theme::kv("Output", &opts.output.display().to_string()));
    println!("  {}", Theme::kv("Entries", &count.to_string()));
    println!("  {}", Theme::kv("Size", &format!("{} bytes", bytes.len())));
    Ok(())
}
