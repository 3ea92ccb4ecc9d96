//! Type-safe command builders and response parsers
//!
//! Each command type knows its device id, command id and payload layout.
//! `CommandFactory` stamps a sequence number on it and encodes the frame.

use std::sync::Arc;

use thiserror::Error;

use crate::codec::{self, Packet};
use crate::protocol::{api_processor, device, driving, error_code, power, system_info};
use crate::sequence::SequenceCounter;
use crate::types::Correlation;

// =============================================================================
// Command
// =============================================================================

/// An encoded outbound command. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    device_id: u8,
    command_id: u8,
    sequence: u8,
    payload: Vec<u8>,
    raw: Vec<u8>,
}

impl Command {
    pub fn new(device_id: u8, command_id: u8, sequence: u8, payload: Vec<u8>) -> Self {
        let raw = codec::encode(device_id, command_id, sequence, &payload);
        Self {
            device_id,
            command_id,
            sequence,
            payload,
            raw,
        }
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Framed, checksummed and escaped bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn correlation(&self) -> Correlation {
        Correlation {
            device_id: self.device_id,
            command_id: self.command_id,
            sequence: self.sequence,
        }
    }

    /// True if `packet` answers this command
    pub fn matches(&self, packet: &Packet) -> bool {
        self.correlation() == packet.correlation()
    }
}

// =============================================================================
// Core Traits
// =============================================================================

/// A command that can be serialized to a payload
pub trait ToyCommand {
    /// Target sub-device
    const DEVICE_ID: u8;

    /// Operation within the sub-device
    const COMMAND_ID: u8;

    /// Serialize the payload (empty for most commands)
    fn to_payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// A response that can be parsed from a packet
pub trait ToyResponse: Sized {
    /// Minimum data length (response code excluded)
    const MIN_LEN: usize;

    /// Parse from response data (response code excluded)
    fn from_data(data: &[u8]) -> Result<Self, ResponseError>;

    /// Parse with validation
    fn parse(packet: &Packet) -> Result<Self, ResponseError> {
        if let Some(code) = packet.response_code() {
            if code != error_code::SUCCESS {
                return Err(ResponseError::Failed {
                    code,
                    name: error_code::name(code),
                });
            }
        }
        let data = packet.data();
        if data.len() < Self::MIN_LEN {
            return Err(ResponseError::TooShort {
                expected: Self::MIN_LEN,
                got: data.len(),
            });
        }
        Self::from_data(data)
    }
}

/// Parse error for responses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Response too short: expected {expected} bytes, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("Toy reported error 0x{code:02X} ({name})")]
    Failed { code: u8, name: &'static str },
}

// =============================================================================
// Command factory
// =============================================================================

/// Builds commands with sequence numbers from a shared counter
#[derive(Debug, Clone, Default)]
pub struct CommandFactory {
    sequence: Arc<SequenceCounter>,
}

impl CommandFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing counter
    pub fn with_counter(sequence: Arc<SequenceCounter>) -> Self {
        Self { sequence }
    }

    pub fn counter(&self) -> &Arc<SequenceCounter> {
        &self.sequence
    }

    /// Assign the next sequence number and encode
    pub fn build<C: ToyCommand>(&self, cmd: &C) -> Command {
        Command::new(
            C::DEVICE_ID,
            C::COMMAND_ID,
            self.sequence.next(),
            cmd.to_payload(),
        )
    }
}

// =============================================================================
// Power
// =============================================================================

/// Wake the toy from soft sleep
#[derive(Debug, Clone, Copy, Default)]
pub struct Wake;

impl ToyCommand for Wake {
    const DEVICE_ID: u8 = device::POWER;
    const COMMAND_ID: u8 = power::WAKE;
}

/// Soft sleep; the toy stays connected
#[derive(Debug, Clone, Copy, Default)]
pub struct Sleep;

impl ToyCommand for Sleep {
    const DEVICE_ID: u8 = device::POWER;
    const COMMAND_ID: u8 = power::SLEEP;
}

/// Deep sleep; the toy drops the connection
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepSleep;

impl ToyCommand for DeepSleep {
    const DEVICE_ID: u8 = device::POWER;
    const COMMAND_ID: u8 = power::DEEP_SLEEP;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBatteryVoltage;

impl ToyCommand for QueryBatteryVoltage {
    const DEVICE_ID: u8 = device::POWER;
    const COMMAND_ID: u8 = power::BATTERY_VOLTAGE;
}

/// Battery voltage, reported in hundredths of a volt (big endian)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryVoltage {
    pub centivolts: u16,
}

impl BatteryVoltage {
    pub fn volts(&self) -> f32 {
        self.centivolts as f32 / 100.0
    }
}

impl ToyResponse for BatteryVoltage {
    const MIN_LEN: usize = 2;

    fn from_data(data: &[u8]) -> Result<Self, ResponseError> {
        Ok(Self {
            centivolts: u16::from_be_bytes([data[0], data[1]]),
        })
    }
}

// =============================================================================
// Driving
// =============================================================================

/// Drive flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriveFlag {
    Reverse = 0x01,
    Boost = 0x02,
    FastTurn = 0x04,
    LeftMotorReverse = 0x08,
    RightMotorReverse = 0x10,
}

impl DriveFlag {
    /// OR a set of flags into the wire byte
    pub fn combine(flags: &[DriveFlag]) -> u8 {
        flags.iter().fold(0, |acc, f| acc | *f as u8)
    }
}

/// Drive at `speed` (0-255) towards `heading` degrees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub speed: u8,
    pub heading: u16,
    pub flags: u8,
}

impl Drive {
    pub fn new(speed: u8, heading: u16, flags: &[DriveFlag]) -> Self {
        Self {
            speed,
            heading,
            flags: DriveFlag::combine(flags),
        }
    }

    /// Same heading and flags, zero speed
    pub fn stop(&self) -> Self {
        Self {
            speed: 0,
            ..self.clone()
        }
    }
}

impl ToyCommand for Drive {
    const DEVICE_ID: u8 = device::DRIVING;
    const COMMAND_ID: u8 = driving::DRIVE_WITH_HEADING;

    fn to_payload(&self) -> Vec<u8> {
        let [hi, lo] = self.heading.to_be_bytes();
        vec![self.speed, hi, lo, self.flags]
    }
}

// =============================================================================
// System info
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryMainAppVersion;

impl ToyCommand for QueryMainAppVersion {
    const DEVICE_ID: u8 = device::SYSTEM_INFO;
    const COMMAND_ID: u8 = system_info::MAIN_APP_VERSION;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBootloaderVersion;

impl ToyCommand for QueryBootloaderVersion {
    const DEVICE_ID: u8 = device::SYSTEM_INFO;
    const COMMAND_ID: u8 = system_info::BOOTLOADER_VERSION;
}

/// Firmware version (major, minor, revision; each big-endian u16)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub revision: u16,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

impl ToyResponse for FirmwareVersion {
    const MIN_LEN: usize = 6;

    fn from_data(data: &[u8]) -> Result<Self, ResponseError> {
        Ok(Self {
            major: u16::from_be_bytes([data[0], data[1]]),
            minor: u16::from_be_bytes([data[2], data[3]]),
            revision: u16::from_be_bytes([data[4], data[5]]),
        })
    }
}

// =============================================================================
// API processor
// =============================================================================

/// Ask the toy to send `data` back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Echo {
    pub data: Vec<u8>,
}

impl ToyCommand for Echo {
    const DEVICE_ID: u8 = device::API_PROCESSOR;
    const COMMAND_ID: u8 = api_processor::ECHO;

    fn to_payload(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Echoed bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EchoReply {
    pub data: Vec<u8>,
}

impl ToyResponse for EchoReply {
    const MIN_LEN: usize = 0;

    fn from_data(data: &[u8]) -> Result<Self, ResponseError> {
        Ok(Self {
            data: data.to_vec(),
        })
    }
}
