//! scoring-worker entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use scoring_worker::WorkerBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments and build configuration
    let config = Cli::parse().into_config()?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("scoring-worker v{}", env!("CARGO_PKG_VERSION"));

    // Build and run the worker
    let mut worker = WorkerBuilder::new(config).build().await?;
    worker.run().await?;

    info!("Goodbye!");
    Ok(())
}
