//! Toy error types

use sphero_transport::{CharacteristicRole, QueueError, ResponseError, TransportError};
use thiserror::Error;

/// Errors from toy operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToyError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A queued command failed
    #[error("Command failed: {0}")]
    Queue(#[from] QueueError),

    /// The toy answered but the reply was unusable
    #[error("Bad response: {0}")]
    Response(#[from] ResponseError),

    /// A characteristic the handshake needs was not discovered
    #[error("Characteristic not found: {0}")]
    MissingCharacteristic(CharacteristicRole),

    #[error("Toy has not completed its startup handshake")]
    NotStarted,

    #[error("Toy was already started")]
    AlreadyStarted,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
