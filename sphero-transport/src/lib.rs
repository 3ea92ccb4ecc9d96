//! Transport layer for the Sphero Mini (API v2 over BLE)
//!
//! This crate provides:
//!
//! - the packet codec (framing, escaping, checksum, streaming decoder)
//! - typed command builders with per-connection sequence numbers
//! - the command queue that correlates responses and handles timeouts
//! - the `Peripheral` contract a BLE backend implements
//! - a btleplug backend (feature `bluetooth`)

pub mod codec;
pub mod command;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod sequence;
pub mod types;

#[cfg(feature = "bluetooth")]
pub mod bluetooth;

pub use codec::{DecodeOutcome, Packet, PacketDecoder, ParseError};
pub use command::{
    BatteryVoltage, Command, CommandFactory, DeepSleep, Drive, DriveFlag, Echo, EchoReply,
    FirmwareVersion, QueryBatteryVoltage, QueryBootloaderVersion, QueryMainAppVersion,
    ResponseError, Sleep, ToyCommand, ToyResponse, Wake,
};
pub use discovery::{match_advertisement, ToyAdvertisement, KNOWN_TOYS};
pub use error::{QueueError, TransportError};
pub use queue::{CommandQueue, PendingCommand, QueueItem, QueueMode, Resolution};
pub use sequence::SequenceCounter;
pub use types::{CharacteristicRole, Correlation, PeripheralEvent};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Narrow peripheral-access contract the driver depends on
///
/// Characteristics are addressed by UUID in simple form
/// (32 lowercase hex digits, no dashes).
#[async_trait]
pub trait Peripheral: Send + Sync {
    /// Open the link to the peripheral
    async fn connect(&self) -> Result<(), TransportError>;

    /// Discover services and return the UUIDs of all characteristics
    async fn discover_characteristics(&self) -> Result<Vec<String>, TransportError>;

    /// Write bytes to a characteristic
    ///
    /// # Arguments
    /// * `characteristic` - UUID of the target characteristic
    /// * `data` - Raw bytes (strings are written as their ASCII bytes)
    /// * `with_response` - Wait for the peripheral's write acknowledgment
    async fn write(
        &self,
        characteristic: &str,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError>;

    /// Enable notifications on a characteristic
    async fn subscribe(&self, characteristic: &str) -> Result<(), TransportError>;

    /// Receive `Read` and `Notify` events
    ///
    /// Call before `subscribe` so no notification is missed.
    fn subscribe_events(&self) -> broadcast::Receiver<PeripheralEvent>;

    /// Advertised name, if known
    fn name(&self) -> Option<String> {
        None
    }
}

/// Type alias for a shared peripheral
pub type BoxedPeripheral = Arc<dyn Peripheral>;
