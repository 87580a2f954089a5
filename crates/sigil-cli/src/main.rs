//! Sigil CLI - signed package runtime
//!
//! Fetches, verifies and launches signed packages. Trust decisions for
//! packages that do not verify against a configured root are asked on the
//! terminal and can be remembered per signer.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod surface;
mod theme;

use commands::{approvals, config, inspect, keygen, pack, run, trust};
use theme::Theme;

/// Sigil - signed package runtime
#[derive(Parser)]
#[command(name = "sigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an additional configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, verify and launch a package
    Run {
        /// Package URL (http/https/file) or local path
        target: String,

        /// Byte offset of the package inside a local file
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Arguments passed to the package entrypoint
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Show a package's header, certificate chain, verdict and contents
    Inspect {
        /// Local package file
        path: PathBuf,

        /// Byte offset of the package inside the file
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Manage remembered trust decisions
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommands,
    },

    /// Inspect trusted roots
    Trust {
        #[command(subcommand)]
        command: TrustCommands,
    },

    /// Create a signing key and certificate
    Keygen {
        /// Certificate common name
        name: String,

        /// Key file (created if missing)
        #[arg(long)]
        key: PathBuf,

        /// Output certificate file
        #[arg(long)]
        cert: PathBuf,

        /// Issue a CA certificate
        #[arg(long)]
        ca: bool,

        /// Validity in days
        #[arg(long, default_value_t = 365)]
        days: u32,

        /// Key of the issuing CA (self-signed when omitted)
        #[arg(long, requires = "issuer_cert")]
        issuer_key: Option<PathBuf>,

        /// Certificate of the issuing CA
        #[arg(long, requires = "issuer_key")]
        issuer_cert: Option<PathBuf>,
    },

    /// Build a package from a directory
    Pack {
        /// Directory containing package.toml and payload files
        dir: PathBuf,

        /// Output package file
        #[arg(short, long)]
        output: PathBuf,

        /// Signing key
        #[arg(long, requires = "chain")]
        key: Option<PathBuf>,

        /// Certificate chain, leaf first
        #[arg(long, requires = "key")]
        chain: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ApprovalCommands {
    /// List remembered approvals
    List,
    /// Forget the approval for a signer
    Revoke {
        /// Signer common name
        signer: String,
    },
    /// Forget all approvals
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TrustCommands {
    /// List trusted root certificates
    List,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output format: toml or json
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Print paths and the files that were loaded
    Paths,
}

fn main() {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("{e:#}")));
            std::process::exit(1);
        },
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let resolved = sigil_config::Config::load(cli.config.as_deref())?;

    let log_config = config_bridge::log_config(&resolved.config, cli.verbose);
    if let Err(e) = sigil_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    tracing::debug!(files = ?resolved.loaded_files, "configuration loaded");

    match cli.command {
        Commands::Run {
            target,
            offset,
            args,
        } => return run::run_package(&resolved, &target, offset, args),
        Commands::Inspect { path, offset } => {
            inspect::inspect_package(&resolved, &path, offset)?;
        },
        Commands::Approvals { command } => match command {
            ApprovalCommands::List => approvals::list_approvals(&resolved)?,
            ApprovalCommands::Revoke { signer } => {
                approvals::revoke_approval(&resolved, &signer)?;
            },
            ApprovalCommands::Clear { yes } => approvals::clear_approvals(&resolved, yes)?,
        },
        Commands::Trust { command } => match command {
            TrustCommands::List => trust::list_roots(&resolved)?,
        },
        Commands::Keygen {
            name,
            key,
            cert,
            ca,
            days,
            issuer_key,
            issuer_cert,
        } => keygen::generate(&keygen::KeygenOptions {
            name,
            key,
            cert,
            ca,
            days,
            issuer_key,
            issuer_cert,
        })?,
        Commands::Pack {
            dir,
            output,
            key,
            chain,
        } => pack::pack(&pack::PackOptions {
            dir,
            output,
            key,
            chain,
        })?,
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => config::show_config(&resolved, &format)?,
            ConfigCommands::Paths => config::show_paths(&resolved),
        },
    }
    Ok(0)
}
