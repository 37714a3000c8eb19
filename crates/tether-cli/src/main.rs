//! Tether CLI - gateway session supervisor.
//!
//! Loads credentials, proxies and messages from the configured files, opens
//! one gateway session per credential and keeps them alive until Ctrl+C or
//! until every session has been retired.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;

use commands::{censor, config, run};

/// Tether - keep a fleet of gateway sessions connected
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file layered over the user config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session per credential and supervise them until Ctrl+C
    Run,

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print a credential the way it appears in logs
    Censor {
        /// Raw credential value
        credential: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show {
        /// Only show one section (e.g. "proxy")
        #[arg(short, long)]
        section: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = tether_config::Config::load(cli.config.as_deref());

    // Set up logging from config, with --verbose override.
    let log_config = if let Ok(resolved) = &loaded {
        let mut lc = config_bridge::to_log_config(&resolved.config);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        let level = if cli.verbose { "debug" } else { "info" };
        tether_telemetry::LogConfig::new(level).with_format(tether_telemetry::LogFormat::Compact)
    };
    if let Err(e) = tether_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let resolved = loaded.context("failed to load configuration")?;

    match cli.command {
        Commands::Run => run::run_fleet(&resolved.config).await,
        Commands::Config {
            command: ConfigCommands::Show { section },
        } => config::show_config(&resolved, section.as_deref()),
        Commands::Censor { credential } => {
            censor::print_censored(&credential, &resolved.config);
            Ok(())
        },
    }
}
