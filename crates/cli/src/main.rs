//! Sagebrush CLI - Database migrations and batch jobs.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! sb-cli migrate
//!
//! # Create or update membership tiers from a YAML file
//! sb-cli tiers seed tiers.yaml
//!
//! # Re-evaluate every customer's tier
//! sb-cli tiers evaluate-all
//!
//! # Rebuild the low-stock snapshot now
//! sb-cli inventory scan
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `LOYALTY_WINDOW_MONTHS`, `LOW_STOCK_DEFAULT_THRESHOLD` - as for the server

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sb-cli")]
#[command(author, version, about = "Sagebrush Commerce CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage membership tiers
    Tiers {
        #[command(subcommand)]
        action: TierAction,
    },
    /// Inventory jobs
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },
}

#[derive(Subcommand)]
enum TierAction {
    /// Create or update tiers from a YAML list, matched by name
    Seed {
        /// Path to the YAML file
        file: PathBuf,
    },
    /// Recompute every customer's tier
    EvaluateAll,
}

#[derive(Subcommand)]
enum InventoryAction {
    /// Rebuild the low-stock snapshot
    Scan,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Tiers { action } => match action {
            TierAction::Seed { file } => commands::tiers::seed(&file).await?,
            TierAction::EvaluateAll => commands::tiers::evaluate_all().await?,
        },
        Commands::Inventory { action } => match action {
            InventoryAction::Scan => commands::inventory::scan().await?,
        },
    }
    Ok(())
}
