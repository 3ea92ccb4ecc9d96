//! Configuration file for the driver
//!
//! TOML at `~/.config/sphero-mini/config.toml`. Every field has a default,
//! so a missing file or a partial one is fine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sphero_toy::ToyConfig;
use sphero_transport::protocol::timing;
use sphero_transport::KNOWN_TOYS;

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// How long to listen for advertisements
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Accepted advertised-name prefixes
    #[serde(default = "default_name_prefixes")]
    pub name_prefixes: Vec<String>,
}

fn default_window_ms() -> u64 {
    timing::SCAN_WINDOW_MS
}
fn default_name_prefixes() -> Vec<String> {
    KNOWN_TOYS.iter().map(|t| t.prefix.to_string()).collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            name_prefixes: default_name_prefixes(),
        }
    }
}

impl ScanConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Complete driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub toy: ToyConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sphero-mini")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            config.toy.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
