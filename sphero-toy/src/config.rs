//! Per-toy settings
//!
//! Embedded as the `[toy]` table of the driver config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sphero_transport::protocol::{handshake, timing};
use sphero_transport::QueueMode;

use crate::error::ToyError;

/// Connection and queue settings for one toy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToyConfig {
    /// How long the executing command may wait for its response
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Queueing policy (only `queue` works)
    #[serde(default)]
    pub queue_mode: QueueMode,
    /// ASCII string written to the anti-DoS characteristic
    #[serde(default = "default_unlock_code")]
    pub unlock_code: String,
    /// Byte written back on a DFU control notification
    #[serde(default = "default_dfu_ack")]
    pub dfu_ack: u8,
}

fn default_command_timeout_ms() -> u64 {
    timing::COMMAND_TIMEOUT_MS
}
fn default_unlock_code() -> String {
    handshake::UNLOCK_CODE.to_string()
}
fn default_dfu_ack() -> u8 {
    handshake::DFU_ACK
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
            queue_mode: QueueMode::default(),
            unlock_code: default_unlock_code(),
            dfu_ack: default_dfu_ack(),
        }
    }
}

impl ToyConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Reject settings the toy can never work with
    pub fn validate(&self) -> Result<(), ToyError> {
        if self.command_timeout_ms == 0 {
            return Err(ToyError::Config("command_timeout_ms must be positive".into()));
        }
        if self.unlock_code.is_empty() || !self.unlock_code.is_ascii() {
            return Err(ToyError::Config(
                "unlock_code must be a non-empty ASCII string".into(),
            ));
        }
        Ok(())
    }
}
