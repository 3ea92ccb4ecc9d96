// CLI definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sphero_toy::DriveFlag;

#[derive(Parser)]
#[command(name = "sphero-mini")]
#[command(author, version, about = "Sphero Mini Bluetooth LE driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/sphero-mini/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Connect to the toy with this advertised name (e.g. SM-1A2B)
    #[arg(long, global = true, conflicts_with = "index")]
    pub name: Option<String>,

    /// Connect to the n-th toy found by the scan
    #[arg(long, global = true)]
    pub index: Option<usize>,

    /// Scan window in milliseconds (overrides the config file)
    #[arg(long, global = true, value_name = "MS")]
    pub scan_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List toys in range
    #[command(visible_alias = "ls")]
    Scan,

    /// Connect, unlock and wake the toy
    Wake,

    /// Put the toy to sleep
    Sleep {
        /// Deep sleep (drops the connection; wake with the charger)
        #[arg(long)]
        deep: bool,
    },

    /// Drive at a speed and heading
    Roll {
        /// Speed (0-255)
        #[arg(short, long)]
        speed: u8,

        /// Heading in degrees (0-359)
        #[arg(long, value_parser = clap::value_parser!(u16).range(0..360))]
        heading: u16,

        /// Keep driving this long, then stop
        #[arg(short, long, value_name = "MS")]
        duration_ms: Option<u64>,

        /// Drive flags (repeatable)
        #[arg(short, long = "flag", value_enum)]
        flags: Vec<DriveFlagArg>,
    },

    /// Read the battery voltage
    #[command(visible_aliases = ["bat", "b"])]
    Battery,

    /// Read firmware versions
    #[command(visible_aliases = ["ver", "v"])]
    Version,

    /// Round-trip text through the toy's echo command
    Echo {
        text: String,
    },
}

/// Drive flags as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriveFlagArg {
    Reverse,
    Boost,
    FastTurn,
    LeftMotorReverse,
    RightMotorReverse,
}

impl From<DriveFlagArg> for DriveFlag {
    fn from(arg: DriveFlagArg) -> Self {
        match arg {
            DriveFlagArg::Reverse => DriveFlag::Reverse,
            DriveFlagArg::Boost => DriveFlag::Boost,
            DriveFlagArg::FastTurn => DriveFlag::FastTurn,
            DriveFlagArg::LeftMotorReverse => DriveFlag::LeftMotorReverse,
            DriveFlagArg::RightMotorReverse => DriveFlag::RightMotorReverse,
        }
    }
}

/// Which of the scanned toys to connect to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToySelector {
    pub name: Option<String>,
    pub index: Option<usize>,
}

impl ToySelector {
    /// Position of the selected toy among the advertised names
    pub fn pick<S: AsRef<str>>(&self, names: &[S]) -> Option<usize> {
        match (&self.name, self.index) {
            (Some(name), _) => names.iter().position(|n| n.as_ref() == name),
            (None, Some(index)) => (index < names.len()).then_some(index),
            (None, None) => (!names.is_empty()).then_some(0),
        }
    }
}

impl Cli {
    pub fn selector(&self) -> ToySelector {
        ToySelector {
            name: self.name.clone(),
            index: self.index,
        }
    }
}
