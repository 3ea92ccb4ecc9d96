//! High-level control for the Sphero Mini
//!
//! This crate runs the connection handshake on top of any `Peripheral`
//! implementation (btleplug, or an in-memory fake in tests) and exposes
//! wake, sleep and drive operations as awaitable commands.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod toy;
mod worker;

pub use config::ToyConfig;
pub use error::ToyError;
pub use lifecycle::{CharacteristicBindings, ConnectionState, Lifecycle};
pub use toy::Toy;

// Re-export the command types callers need alongside `Toy`
pub use sphero_transport::{
    BatteryVoltage, DriveFlag, FirmwareVersion, Packet, PendingCommand, QueueError, QueueMode,
};
