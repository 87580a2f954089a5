//! Run command: fetch, verify, approve and launch one package.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sigil_approval::ApprovalStore;
use sigil_config::ResolvedConfig;
use sigil_download::{DownloadEngine, TokioConnector};
use sigil_runtime::{
    InstanceEvent, InstanceManager, InstanceState, InstanceStatus, PackageSource, ProcessRuntime,
};
use sigil_trust::TrustClassifier;
use tracing::info;
use url::Url;

use crate::config_bridge;
use crate::surface::TerminalSurface;
use crate::theme::Theme;

/// Work out where a package comes from. `http(s)` URLs are remote, anything
/// else is a path.
pub(crate) fn parse_source(target: &str, offset: u64) -> Result<PackageSource> {
    match Url::parse(target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            if offset != 0 {
                bail!("--offset only applies to local files");
            }
            Ok(PackageSource::Url(url))
        },
        Ok(url) if url.scheme() == "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| anyhow::anyhow!("not a local file URL: {target}"))?;
            Ok(PackageSource::Local { path, offset })
        },
        _ => Ok(PackageSource::Local {
            path: target.into(),
            offset,
        }),
    }
}

fn download_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.blue} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Run a package to completion and return the exit code to report.
pub(crate) fn run_package(
    resolved: &ResolvedConfig,
    target: &str,
    offset: u64,
    args: Vec<String>,
) -> Result<i32> {
    let config = &resolved.config;
    let source = parse_source(target, offset)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let store = config_bridge::trust_store(resolved)?;
    let approvals_path = config_bridge::approvals_path(resolved);
    let approvals = ApprovalStore::load(&approvals_path)
        .with_context(|| format!("failed to load {}", approvals_path.display()))?;

    let bar = download_bar();
    let prompt_bar = bar.clone();
    let surface = TerminalSurface::new(move || prompt_bar.finish_and_clear());

    let engine = DownloadEngine::new(
        Box::new(TokioConnector::new(runtime.handle().clone())),
        config_bridge::engine_config(&config.download),
    );
    let mut app_runtime = ProcessRuntime::new(runtime.handle().clone());
    if let Some(dir) = &config.runtime.work_dir {
        app_runtime = app_runtime.with_work_dir(dir);
    }

    let mut manager = InstanceManager::new(
        engine,
        TrustClassifier::new(Arc::new(store)),
        Box::new(surface),
        Box::new(app_runtime),
    )
    .with_approvals(approvals)
    .with_auto_approve_verified(config.trust.auto_approve_verified);

    println!("{}", Theme::info(&format!("Opening {source}")));
    let id = manager.create_instance(source, args);
    let tick = Duration::from_millis(config.runtime.tick_interval_ms);

    let status = loop {
        manager.tick();
        for event in manager.drain_events() {
            report(&event, &bar);
        }

        let status = manager
            .status(id)
            .context("instance disappeared while running")?;
        if let Some(progress) = status.progress {
            if let Some(total) = progress.expected {
                bar.set_length(total);
            }
            bar.set_position(progress.received);
        }
        if matches!(status.state, InstanceState::Stopped | InstanceState::Failed) {
            break status;
        }
        std::thread::sleep(tick);
    };
    bar.finish_and_clear();

    if status.approval.as_ref().is_some_and(|a| a.interactive) {
        manager
            .approvals()
            .save(&approvals_path)
            .with_context(|| format!("failed to save {}", approvals_path.display()))?;
    }

    Ok(finish(&status))
}

fn report(event: &InstanceEvent, bar: &ProgressBar) {
    let InstanceEvent::StateChanged { id, from, to } = event;
    info!(instance_id = %id, from = %from, to = %to, "instance state changed");

    match to {
        InstanceState::Downloading => {
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.set_message("Downloading");
            bar.enable_steady_tick(Duration::from_millis(100));
        },
        InstanceState::Verifying => {
            bar.finish_and_clear();
            println!("{}", Theme::dimmed("Verifying signature..."));
        },
        InstanceState::Running => {
            println!("{}", Theme::success("Package approved, running"));
            println!("{}", Theme::separator());
        },
        _ => {},
    }
}

/// Print the outcome and map it to an exit code.
fn finish(status: &InstanceStatus) -> i32 {
    if status.state == InstanceState::Stopped {
        println!("{}", Theme::separator());
        return match status.exit_code {
            Some(code) => {
                println!("{}", Theme::dimmed(&format!("Exited with status {code}")));
                code
            },
            None => {
                println!("{}", Theme::warning("Application was terminated"));
                1
            },
        };
    }

    let reason = status
        .failure
        .as_ref()
        .map_or_else(|| "unknown failure".to_owned(), ToString::to_string);
    eprintln!("{}", Theme::error(&format!("Launch failed: {reason}")));
    eprintln!("  {}", Theme::kv("State", &Theme::state(status.state)));
    if let Some(verdict) = status.verdict {
        eprintln!("  {}", Theme::kv("Verdict", &Theme::verdict(verdict)));
    }
    1
}
