//! Approvals command: list and forget remembered trust decisions.

use anyhow::{Context, Result};
use sigil_approval::ApprovalStore;
use sigil_config::ResolvedConfig;

use crate::config_bridge;
use crate::theme::Theme;

fn load(resolved: &ResolvedConfig) -> Result<(ApprovalStore, std::path::PathBuf)> {
    let path = config_bridge::approvals_path(resolved);
    let store = ApprovalStore::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((store, path))
}

/// List remembered approvals.
pub(crate) fn list_approvals(resolved: &ResolvedConfig) -> Result<()> {
    let (store, path) = load(resolved)?;

    println!("\n{}", Theme::header("Remembered approvals"));
    println!("  {}", Theme::dimmed(&path.display().to_string()));
    println!();

    if store.is_empty() {
        println!("  {}", Theme::dimmed("(none)"));
    }
    for record in store.records() {
        let how = if record.interactive { "asked" } else { "policy" };
        println!(
            "  {}  {}  {}  {}",
            record.signer,
            Theme::verdict(record.verdict),
            Theme::dimmed(&record.decided_at.format("%Y-%m-%d %H:%M").to_string()),
            Theme::dimmed(how),
        );
    }
    println!();
    Ok(())
}

/// Forget the approval for `signer`.
pub(crate) fn revoke_approval(resolved: &ResolvedConfig, signer: &str) -> Result<()> {
    let (mut store, path) = load(resolved)?;

    if store.revoke(signer).is_none() {
        println!(
            "{}",
            Theme::warning(&format!("No approval remembered for {signer}"))
        );
        return Ok(());
    }
    store.save(&path)?;
    println!("{}", Theme::success(&format!("Revoked approval for {signer}")));
    Ok(())
}

/// Forget every approval, asking first unless `yes`.
pub(crate) fn clear_approvals(resolved: &ResolvedConfig, yes: bool) -> Result<()> {
    let (mut store, path) = load(resolved)?;

    if store.is_empty() {
        println!("{}", Theme::info("No approvals to clear."));
        return Ok(());
    }

    if !yes {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!("Forget {} remembered approvals?", store.len()))
            .default(false)
            .interact()?;
        if !confirm {
            println!("{}", Theme::info("Aborted."));
            return Ok(());
        }
    }

    let count = store.len();
    store.clear();
    store.save(&path)?;
    println!("{}", Theme::success(&format!("Cleared {count} approvals")));
    Ok(())
}
