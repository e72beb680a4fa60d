//! rugscan - rug-pull risk scanner for token deployers
//!
//! Traces the funding history of a token's deployer wallet through Arkham
//! Intelligence and scores the result.
//!
//! # NOTE
//! - Scores are heuristics over provider data; they are not on-chain proof.
//! - INCONCLUSIVE means the provider could not answer, not that a token is safe.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use rug_scanner::cli::commands::{self, OutputFormat, TargetKind};
use rug_scanner::config::Config;

/// Rug-pull risk scanner
#[derive(Parser)]
#[command(name = "rugscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "rugscan.toml")]
    config: String,

    /// Arkham API key (overrides the config file)
    #[arg(long, env = "ARKHAM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan tokens (or deployer wallets with --deployer) for rug-pull risk
    Scan {
        /// Token or deployer addresses
        #[arg(required = true)]
        targets: Vec<String>,

        /// Treat targets as deployer wallets instead of tokens
        #[arg(long)]
        deployer: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Scans to run at once (overrides batch.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the funding trace of a wallet without scoring it
    Trace {
        /// Wallet address
        address: String,

        /// Upstream hops to walk (overrides scan.max_hops)
        #[arg(long)]
        max_hops: Option<u32>,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing (stderr, so stdout stays clean for results)
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("rug_scanner=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }

    // Load configuration
    let mut config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Some(key) = cli.api_key {
        config.provider.api_key = key;
    }

    // Execute command
    let result = match cli.command {
        Commands::Scan {
            targets,
            deployer,
            json,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.batch.concurrency = concurrency.max(1);
            }
            let kind = if deployer {
                TargetKind::Deployer
            } else {
                TargetKind::Token
            };
            let format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            };
            commands::scan(&config, &targets, kind, format).await
        }
        Commands::Trace { address, max_hops } => commands::trace(&config, &address, max_hops).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
