//! Sphero Mini driver
//!
//! Configuration and command-line definitions for the `sphero-mini` tool.
//! The protocol lives in `sphero-transport`, the handshake and toy control
//! in `sphero-toy`.

pub mod cli;
pub mod config;

pub use config::{DriverConfig, ScanConfig};
