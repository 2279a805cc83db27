pub mod types;
pub mod config;
pub mod data;
pub mod boundaries;
pub mod region_index;
pub mod figure;
pub mod selection;
pub mod server;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the region boundaries and pin them locally
    Fetch {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Re-download even if a pinned copy exists
        #[arg(long)]
        force: bool,
    },
    /// Load every input and report join problems without serving
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Fetch { config, force } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let boundaries = &app_config.boundaries;

            if boundaries.cache.exists() && !force {
                info!("{:?} already pinned, use --force to re-download", boundaries.cache);
                return Ok(());
            }
            boundaries::fetch_and_pin(boundaries).await?;
        }
        Commands::Check { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let state = load_state(app_config).await?;

            info!(
                "OK: {} regions in workbook, {} boundary features, {} annual rows",
                state.data.mean.regions().len(),
                state.index.len(),
                state.data.annual.rows.len()
            );
        }
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let state = load_state(app_config).await?;

            server::start_server(state).await?;
        }
    }

    Ok(())
}

/// Everything that must succeed before the server may start.
async fn load_state(app_config: config::AppConfig) -> anyhow::Result<server::AppState> {
    // 1. Climate tables
    let data = data::load_data(&app_config)?;

    // 2. Boundaries, from the pinned copy when there is one
    let collection = boundaries::load_boundaries(&app_config.boundaries)
        .await
        .context("Failed to load region boundaries")?;

    // 3. Region index
    let index = region_index::RegionIndex::new(collection, &app_config.boundaries.join_key)
        .context("Failed to index region boundaries")?;

    let unmatched = index.unmatched_regions(&data.mean);
    if !unmatched.is_empty() {
        warn!("{} workbook regions have no boundary feature: {:?}", unmatched.len(), unmatched);
    }

    Ok(server::AppState::new(app_config, data, index))
}
