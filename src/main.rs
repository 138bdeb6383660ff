//! Custodial sweep reconciler
//!
//! Works out which planned vault transfers remain, prices them, and sorts
//! them by what is blocking execution.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use custody_sweep::cli::commands;
use custody_sweep::config::Config;

/// Custodial sweep reconciler
#[derive(Parser)]
#[command(name = "sweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sweep.toml")]
    config: String,

    /// JSON file with overrides / basis symbols / coingecko ids / minimums
    #[arg(long, env = "SWEEP_TABLES")]
    tables: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile, price and classify remaining transfers
    Analyze {
        /// Do not call the live price feed
        #[arg(long)]
        offline: bool,

        /// Disable the $1 stable-asset fallback
        #[arg(long)]
        strict: bool,

        /// Output directory for reports
        #[arg(long)]
        out: Option<String>,
    },

    /// Resolve and show prices for all assets
    Prices {
        /// Do not call the live price feed
        #[arg(long)]
        offline: bool,
    },

    /// Show completed vs remaining plan rows
    LedgerStatus,

    /// Record row ids (source|asset|destination) as completed
    MarkComplete {
        /// Row ids to record
        #[arg(required = true)]
        ids: Vec<String>,

        /// Show what would be recorded without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("custody_sweep=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::load(&cli.config, cli.tables.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Analyze {
            offline,
            strict,
            out,
        } => {
            config.pricing.offline |= offline;
            config.pricing.strict |= strict;
            commands::analyze(&config, out).await
        }
        Commands::Prices { offline } => {
            config.pricing.offline |= offline;
            commands::prices(&config).await
        }
        Commands::LedgerStatus => commands::ledger_status(&config),
        Commands::MarkComplete { ids, dry_run } => commands::mark_complete(&config, &ids, dry_run),
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
