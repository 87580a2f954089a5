//! Config command: show the effective configuration and where it came from.

use anyhow::{Result, bail};
use sigil_config::{ConfigLayer, ResolvedConfig};

use crate::config_bridge;
use crate::theme::Theme;

/// Print the merged configuration as `toml` or `json`.
pub(crate) fn show_config(resolved: &ResolvedConfig, format: &str) -> Result<()> {
    let rendered = match format {
        "toml" => resolved.config.to_toml_string()?,
        "json" => resolved.config.to_json_string()?,
        other => bail!("unknown format '{other}', expected toml or json"),
    };
    println!("{rendered}");
    Ok(())
}

/// Print the files and directories in use.
pub(crate) fn show_paths(resolved: &ResolvedConfig) {
    println!("\n{}", Theme::header("Paths"));
    println!(
        "  {}",
        Theme::kv("Home", &resolved.home.display().to_string())
    );
    println!(
        "  {}",
        Theme::kv(
            "Trust roots",
            &config_bridge::roots_dir(resolved).display().to_string()
        )
    );
    println!(
        "  {}",
        Theme::kv(
            "Approvals",
            &config_bridge::approvals_path(resolved)
                .display()
                .to_string()
        )
    );

    println!("\n{}", Theme::header("Loaded files"));
    if resolved.loaded_files.is_empty() {
        println!("  {}", Theme::dimmed("(defaults only)"));
    }
    for file in &resolved.loaded_files {
        println!("  {file}");
    }

    let mut overridden: Vec<_> = resolved
        .field_sources
        .iter()
        .filter(|(_, layer)| **layer != ConfigLayer::Defaults)
        .collect();
    overridden.sort_by(|a, b| a.0.cmp(b.0));
    if !overridden.is_empty() {
        println!("\n{}", Theme::header("Field sources"));
        for (field, layer) in overridden {
            println!("  {}", Theme::kv(field, &layer.to_string()));
        }
    }
    println!();
}
