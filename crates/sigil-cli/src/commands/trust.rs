//! Trust command: show the configured root certificates.

use anyhow::Result;
use sigil_config::ResolvedConfig;

use crate::config_bridge;
use crate::theme::Theme;

/// List trusted roots.
pub(crate) fn list_roots(resolved: &ResolvedConfig) -> Result<()> {
    let dir = config_bridge::roots_dir(resolved);
    let store = config_bridge::trust_store(resolved)?;

    println!("\n{}", Theme::header("Trusted roots"));
    println!("  {}", Theme::dimmed(&dir.display().to_string()));
    println!();

    let mut roots: Vec<_> = store.roots().collect();
    roots.sort_by_key(|cert| cert.common_name());

    if roots.is_empty() {
        println!("  {}", Theme::dimmed("(none)"));
    }
    for root in roots {
        println!(
            "  {}  {}  {}",
            root.common_name(),
            Theme::dimmed(&hex::encode(root.key_id())),
            Theme::dimmed(&root.fingerprint().to_string()),
        );
    }
    println!();
    Ok(())
}
