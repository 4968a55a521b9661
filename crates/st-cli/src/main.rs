//! sshtie CLI
//!
//! SSH + mosh + tmux profiles, one command to connect:
//! - `sshtie <name>` / `sshtie connect <name>` to reach a profile's tmux session
//! - profile management (list, show, add, remove, rename, copy, edit)
//! - `ssh-config` to expose profiles to other SSH tools
//! - `status` and `doctor` diagnostics

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sshtie::commands;
use sshtie::exit;
use sshtie::output::print_error;
use st_core::config::{self, serde_utils::parse_duration, NetworkMode, ProfileEntry};
use st_core::{session_lock, tailscale, ProfileStore, TransportKind};

#[derive(Parser)]
#[command(name = "sshtie")]
#[command(author, version, about = "SSH + mosh + tmux profiles, one command to connect")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the profile file
    #[arg(long, global = true, env = "SSHTIE_PROFILES")]
    profiles: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Profile to connect to (same as `sshtie connect <name>`)
    profile: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a profile (mosh → ssh fallback → tmux)
    Connect {
        /// Profile name
        name: String,
        /// Print the session outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List profiles
    List {
        /// Only show profiles with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Show a resolved profile and its transport plan
    Show {
        /// Profile name
        name: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a profile
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Transport order, comma separated (e.g. mosh,ssh)
        #[arg(short, long = "transport", value_delimiter = ',')]
        transport: Vec<TransportKind>,
        /// tmux session name, or "auto"
        #[arg(long)]
        tmux_session: Option<String>,
        /// Connect timeout per transport (e.g. 10, 10s, 500ms)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
        /// SSH private key
        #[arg(short, long)]
        key: Option<String>,
        /// Remote mosh-server path
        #[arg(long)]
        mosh_server: Option<String>,
        /// Tag, may be repeated
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Network mode: auto, tailscale or direct (ssh only)
        #[arg(long, value_parser = parse_network)]
        network: Option<NetworkMode>,
    },

    /// Remove a profile
    #[command(alias = "rm")]
    Remove { name: String },

    /// Rename a profile
    Rename { from: String, to: String },

    /// Copy a profile under a new name
    Copy { from: String, to: String },

    /// Edit a profile in $VISUAL / $EDITOR
    Edit { name: String },

    /// Sync profiles into ~/.ssh/config for other SSH tools
    SshConfig {
        /// ssh config file to update instead of ~/.ssh/config
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show active sessions
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose connectivity for a profile
    Doctor { name: String },

    /// Configuration locations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show config directory and profile file paths
    Path,
}

fn parse_network(s: &str) -> Result<NetworkMode, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(NetworkMode::Auto),
        "tailscale" => Ok(NetworkMode::Tailscale),
        "direct" => Ok(NetworkMode::Direct),
        other => Err(format!(
            "unknown network mode {:?} (expected auto, tailscale or direct)",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            exit::for_error(&e)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(cli: Cli) -> Result<i32> {
    let profiles_path = cli
        .profiles
        .clone()
        .unwrap_or_else(config::default_profiles_path);

    let command = match (cli.command, cli.profile) {
        (Some(cmd), _) => cmd,
        (None, Some(name)) => Commands::Connect { name, json: false },
        (None, None) => {
            show_overview(&profiles_path);
            return Ok(exit::SUCCESS);
        }
    };

    match command {
        Commands::Connect { name, json } => {
            let store = Arc::new(load_store(&profiles_path)?);
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            commands::connect_command(store, &name, json, cancel).await
        }

        Commands::List { tag } => {
            commands::list_command(&load_store(&profiles_path)?, tag.as_deref())?;
            Ok(exit::SUCCESS)
        }

        Commands::Show { name, json } => {
            commands::show_command(&load_store(&profiles_path)?, &name, json)?;
            Ok(exit::SUCCESS)
        }

        Commands::Add {
            name,
            host,
            user,
            port,
            transport,
            tmux_session,
            timeout,
            key,
            mosh_server,
            tags,
            network,
        } => {
            let entry = ProfileEntry {
                name,
                host,
                user,
                port,
                transport_order: (!transport.is_empty()).then_some(transport),
                tmux_session,
                connect_timeout: timeout,
                key,
                mosh_server,
                network,
                tags,
            };
            commands::add_command(&profiles_path, entry)?;
            Ok(exit::SUCCESS)
        }

        Commands::Remove { name } => {
            commands::remove_command(&profiles_path, &name)?;
            Ok(exit::SUCCESS)
        }

        Commands::Rename { from, to } => {
            commands::rename_command(&profiles_path, &from, &to)?;
            Ok(exit::SUCCESS)
        }

        Commands::Copy { from, to } => {
            commands::copy_command(&profiles_path, &from, &to)?;
            Ok(exit::SUCCESS)
        }

        Commands::Edit { name } => {
            commands::edit_command(&profiles_path, &name, &commands::default_editor())?;
            Ok(exit::SUCCESS)
        }

        Commands::SshConfig { path } => {
            commands::ssh_config_command(&load_store(&profiles_path)?, path)?;
            Ok(exit::SUCCESS)
        }

        Commands::Status { json } => {
            commands::status_command(&config::default_sessions_dir(), json)?;
            Ok(exit::SUCCESS)
        }

        Commands::Doctor { name } => {
            commands::doctor_command(&load_store(&profiles_path)?, &name).await
        }

        Commands::Config { action } => match action {
            ConfigAction::Path => {
                println!("Config directory: {}", config::default_config_dir().display());
                println!("Profiles: {}", profiles_path.display());
                println!("Sessions: {}", config::default_sessions_dir().display());
                Ok(exit::SUCCESS)
            }
        },
    }
}

fn load_store(path: &std::path::Path) -> Result<ProfileStore> {
    ProfileStore::load(path)
        .with_context(|| format!("Failed to load profiles from {}", path.display()))
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, cancelling...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, cancelling...");
            }
        }

        cancel.cancel();
    });
}

// ============================================================================
// Overview
// ============================================================================

fn show_overview(profiles_path: &std::path::Path) {
    println!();
    println!("  \x1b[1;34msshtie\x1b[0m - SSH + mosh + tmux profiles, one command to connect");
    println!();

    match ProfileStore::load(profiles_path) {
        Ok(store) => println!("  Profiles: {} ({})", store.len(), profiles_path.display()),
        Err(e) => println!("  Profiles: \x1b[31m●\x1b[0m {}", e),
    }

    match session_lock::list_active(&config::default_sessions_dir()) {
        Ok(records) => println!("  Active sessions: {}", records.len()),
        Err(e) => tracing::debug!("Failed to read session records: {}", e),
    }

    match tailscale::status() {
        Ok(Some(state)) if state.running => {
            println!("  Tailscale: \x1b[32m●\x1b[0m {}", state.tailnet);
        }
        Ok(Some(_)) => {
            println!("  Tailscale: \x1b[33m●\x1b[0m Not running");
        }
        _ => {
            println!("  Tailscale: \x1b[90m●\x1b[0m Not installed");
        }
    }

    println!();
    println!("  Commands:");
    println!("    sshtie <name>             Connect to a profile");
    println!("    sshtie add --name --host  Add a profile");
    println!("    sshtie list               List profiles");
    println!("    sshtie edit <name>        Edit a profile in $EDITOR");
    println!("    sshtie doctor <name>      Diagnose a profile");
    println!();
}
