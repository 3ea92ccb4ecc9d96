//! Transport and queue error types

use std::time::Duration;

use thiserror::Error;

use crate::queue::QueueMode;
use crate::types::Correlation;

/// Errors raised by a peripheral-access call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Service discovery failed: {0}")]
    Discovery(String),

    #[error("Write to {characteristic} failed: {reason}")]
    Write {
        characteristic: String,
        reason: String,
    },

    #[error("Subscribe to {characteristic} failed: {reason}")]
    Subscribe {
        characteristic: String,
        reason: String,
    },

    #[error("Unknown characteristic: {0}")]
    UnknownCharacteristic(String),

    #[error("Device disconnected")]
    Disconnected,

    // btleplug backend
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Errors that fail a queued command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    /// A valid packet arrived that does not answer the executing command
    #[error("Response mismatch: expected {expected}, got {actual}")]
    Mismatch {
        expected: Correlation,
        actual: Correlation,
    },

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Queue mode {0:?} is not implemented")]
    UnsupportedMode(QueueMode),

    /// The queue shut down before the command resolved
    #[error("Command queue closed")]
    Closed,
}
