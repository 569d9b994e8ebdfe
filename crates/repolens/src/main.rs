//! Repolens ingestion service
//!
//! Runs the job scheduler and its ingestion workers against the primary
//! and vector stores, or performs one-off schema setup.

mod bootstrap;

use clap::{Parser, Subcommand};
use repolens_config::ApplicationConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repolens", version, about = "Repository ingestion and embedding service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and ingestion workers until shutdown
    Serve,
    /// Ensure the database schema exists, then exit
    MigrateSchema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    repolens_common::initialize_environment();

    let cli = Cli::parse();
    let config = ApplicationConfig::from_env()?;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.tracing_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve => bootstrap::serve(config).await,
        Command::MigrateSchema => bootstrap::migrate_schema(&config).await,
    }
}
