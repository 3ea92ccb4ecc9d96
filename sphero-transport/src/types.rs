//! Common types for the transport layer

use std::fmt;

use crate::protocol::{device, gatt};

/// The identifying triple used to match a response to its command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Correlation {
    pub device_id: u8,
    pub command_id: u8,
    pub sequence: u8,
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:02X} #{}",
            device::name(self.device_id),
            self.command_id,
            self.sequence
        )
    }
}

/// Characteristics the driver binds by UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicRole {
    /// API v2 command/response channel
    Control,
    /// DFU control point
    DfuControl,
    /// DFU info
    DfuInfo,
    /// Anti-DoS unlock characteristic
    AntiDos,
}

impl CharacteristicRole {
    pub const ALL: [CharacteristicRole; 4] = [
        CharacteristicRole::Control,
        CharacteristicRole::DfuControl,
        CharacteristicRole::DfuInfo,
        CharacteristicRole::AntiDos,
    ];

    /// Simple-form UUID of the characteristic
    pub fn uuid(self) -> &'static str {
        match self {
            CharacteristicRole::Control => gatt::API_V2_CHARACTERISTIC,
            CharacteristicRole::DfuControl => gatt::DFU_CONTROL_CHARACTERISTIC,
            CharacteristicRole::DfuInfo => gatt::DFU_INFO_CHARACTERISTIC,
            CharacteristicRole::AntiDos => gatt::ANTI_DOS_CHARACTERISTIC,
        }
    }

    /// Match a discovered characteristic UUID, ignoring case and dashes
    pub fn from_uuid(uuid: &str) -> Option<Self> {
        let simple: String = uuid
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL.into_iter().find(|role| role.uuid() == simple)
    }
}

impl fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CharacteristicRole::Control => "api-v2 control",
            CharacteristicRole::DfuControl => "dfu control",
            CharacteristicRole::DfuInfo => "dfu info",
            CharacteristicRole::AntiDos => "anti-dos",
        })
    }
}

/// Events emitted by a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// Bytes received on a characteristic
    Read {
        characteristic: String,
        data: Vec<u8>,
        is_notification: bool,
    },
    /// Notification state changed on a characteristic
    Notify {
        characteristic: String,
        enabled: bool,
    },
}

impl PeripheralEvent {
    pub fn characteristic(&self) -> &str {
        match self {
            PeripheralEvent::Read { characteristic, .. } => characteristic,
            PeripheralEvent::Notify { characteristic, .. } => characteristic,
        }
    }
}
