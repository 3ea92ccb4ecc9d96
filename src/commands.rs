//! Command handlers for the CLI application.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sphero_driver::cli::ToySelector;
use sphero_driver::config::DriverConfig;
use sphero_toy::{DriveFlag, Toy};
use sphero_transport::bluetooth::{BluetoothDiscovery, DiscoveredToy};
use tracing::info;

async fn discover(config: &DriverConfig) -> Result<Vec<DiscoveredToy>> {
    let discovery = BluetoothDiscovery::new().await?;
    let toys = discovery
        .find_toys(config.scan.window(), &config.scan.name_prefixes)
        .await?;
    Ok(toys)
}

/// Scan, pick a toy and run the startup handshake on it
async fn connect(config: &DriverConfig, selector: &ToySelector) -> Result<Toy> {
    let mut toys = discover(config).await?;
    let names: Vec<&str> = toys.iter().map(|t| t.name.as_str()).collect();
    let index = selector
        .pick(&names)
        .ok_or_else(|| anyhow!("No matching toy found (try `sphero-mini scan`)"))?;
    let found = toys.swap_remove(index);

    info!("Connecting to {} ({})", found.name, found.address);
    let toy = Toy::new(Arc::new(found.peripheral), config.toy.clone())?;
    toy.start()
        .await
        .with_context(|| format!("Starting {} failed", found.name))?;
    Ok(toy)
}

pub async fn scan(config: &DriverConfig) -> Result<()> {
    let toys = discover(config).await?;
    if toys.is_empty() {
        println!("No toys found");
        return Ok(());
    }
    for (i, toy) in toys.iter().enumerate() {
        println!("{i}: {} [{}] {}", toy.name, toy.model, toy.address);
    }
    Ok(())
}

pub async fn wake(config: &DriverConfig, selector: &ToySelector) -> Result<()> {
    let toy = connect(config, selector).await?;
    println!("{} is awake", toy.name().unwrap_or_default());
    Ok(())
}

pub async fn sleep(config: &DriverConfig, selector: &ToySelector, deep: bool) -> Result<()> {
    let toy = connect(config, selector).await?;
    let pending = if deep { toy.deep_sleep() } else { toy.sleep() };
    pending.context("Toy is not started")?.await?;
    println!("{}", if deep { "Deep sleep" } else { "Sleeping" });
    Ok(())
}

pub async fn roll(
    config: &DriverConfig,
    selector: &ToySelector,
    speed: u8,
    heading: u16,
    duration_ms: Option<u64>,
    flags: &[DriveFlag],
) -> Result<()> {
    let toy = connect(config, selector).await?;
    match duration_ms {
        Some(ms) => {
            toy.roll_time(speed, heading, Duration::from_millis(ms), flags)
                .await?;
        }
        None => {
            toy.roll(speed, heading, flags)
                .context("Toy is not started")?
                .await?;
        }
    }
    Ok(())
}

pub async fn battery(config: &DriverConfig, selector: &ToySelector) -> Result<()> {
    let toy = connect(config, selector).await?;
    let battery = toy.battery_voltage().await?;
    println!("Battery: {:.2} V", battery.volts());
    Ok(())
}

pub async fn version(config: &DriverConfig, selector: &ToySelector) -> Result<()> {
    let toy = connect(config, selector).await?;
    let app = toy.main_app_version().await?;
    let bootloader = toy.bootloader_version().await?;
    println!("Main app:   {app}");
    println!("Bootloader: {bootloader}");
    Ok(())
}

pub async fn echo(config: &DriverConfig, selector: &ToySelector, text: &str) -> Result<()> {
    let toy = connect(config, selector).await?;
    let reply = toy.echo(text.as_bytes()).await?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}
