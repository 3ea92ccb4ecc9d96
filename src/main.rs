//! `sphero-mini`: scan for and drive a Sphero Mini over Bluetooth LE

use anyhow::Result;
use clap::Parser;
use sphero_toy::DriveFlag;
use tracing::info;

use sphero_driver::cli::{Cli, Commands};
use sphero_driver::config::DriverConfig;

mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    info!("Loading config from {:?}", config_path);
    let mut config = DriverConfig::load(&config_path)?;
    if let Some(ms) = cli.scan_ms {
        config.scan.window_ms = ms;
    }
    let selector = cli.selector();

    match cli.command {
        Commands::Scan => commands::scan(&config).await,
        Commands::Wake => commands::wake(&config, &selector).await,
        Commands::Sleep { deep } => commands::sleep(&config, &selector, deep).await,
        Commands::Roll {
            speed,
            heading,
            duration_ms,
            flags,
        } => {
            let flags: Vec<DriveFlag> = flags.into_iter().map(Into::into).collect();
            commands::roll(&config, &selector, speed, heading, duration_ms, &flags).await
        }
        Commands::Battery => commands::battery(&config, &selector).await,
        Commands::Version => commands::version(&config, &selector).await,
        Commands::Echo { text } => commands::echo(&config, &selector, &text).await,
    }
}
