//! Connection lifecycle
//!
//! Brings a connected peripheral to the point where it accepts commands:
//!
//! ```text
//! Disconnected ─connect─► Connected ─discover─► ServicesBound ─unlock─► Unlocking
//!                                                                          │
//!                         Awake ◄─mark_awake── Subscribing ◄──subscribe────┘
//! ```
//!
//! Each step advances the state only after its transport call succeeds, so
//! a failed startup leaves the state where the failing step began.

use std::fmt;

use sphero_transport::{CharacteristicRole, Peripheral};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ToyError;

/// Connection state of a toy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    ServicesBound,
    Unlocking,
    Subscribing,
    /// Accepting commands
    Awake,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::ServicesBound => "services bound",
            ConnectionState::Unlocking => "unlocking",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Awake => "awake",
        };
        f.write_str(name)
    }
}

/// Discovered characteristic UUID for each role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacteristicBindings {
    control: Option<String>,
    dfu_control: Option<String>,
    dfu_info: Option<String>,
    anti_dos: Option<String>,
}

impl CharacteristicBindings {
    /// Bind the known roles among discovered UUIDs; unknown UUIDs are ignored
    pub fn bind<S: AsRef<str>>(uuids: &[S]) -> Self {
        let mut bindings = Self::default();
        for uuid in uuids {
            let uuid = uuid.as_ref();
            debug!("Discovered characteristic {}", uuid);
            if let Some(role) = CharacteristicRole::from_uuid(uuid) {
                *bindings.slot_mut(role) = Some(uuid.to_string());
            }
        }
        bindings
    }

    fn slot_mut(&mut self, role: CharacteristicRole) -> &mut Option<String> {
        match role {
            CharacteristicRole::Control => &mut self.control,
            CharacteristicRole::DfuControl => &mut self.dfu_control,
            CharacteristicRole::DfuInfo => &mut self.dfu_info,
            CharacteristicRole::AntiDos => &mut self.anti_dos,
        }
    }

    pub fn get(&self, role: CharacteristicRole) -> Option<&str> {
        match role {
            CharacteristicRole::Control => self.control.as_deref(),
            CharacteristicRole::DfuControl => self.dfu_control.as_deref(),
            CharacteristicRole::DfuInfo => self.dfu_info.as_deref(),
            CharacteristicRole::AntiDos => self.anti_dos.as_deref(),
        }
    }

    /// UUID bound to `role`, or `MissingCharacteristic`
    pub fn require(&self, role: CharacteristicRole) -> Result<&str, ToyError> {
        self.get(role)
            .ok_or(ToyError::MissingCharacteristic(role))
    }

    /// Which role a characteristic UUID is bound to
    pub fn role_of(&self, uuid: &str) -> Option<CharacteristicRole> {
        CharacteristicRole::ALL
            .into_iter()
            .find(|role| self.get(*role) == Some(uuid))
    }
}

/// Handshake steps and the state they move through
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<ConnectionState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { state }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn advance(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        debug!("Connection state {} -> {}", prev, next);
    }

    /// Open the link
    pub async fn connect(&self, peripheral: &dyn Peripheral) -> Result<(), ToyError> {
        peripheral.connect().await?;
        self.advance(ConnectionState::Connected);
        Ok(())
    }

    /// Discover characteristics and bind them by role
    pub async fn bind_services(
        &self,
        peripheral: &dyn Peripheral,
    ) -> Result<CharacteristicBindings, ToyError> {
        let uuids = peripheral.discover_characteristics().await?;
        let bindings = CharacteristicBindings::bind(&uuids);
        self.advance(ConnectionState::ServicesBound);
        Ok(bindings)
    }

    /// Write the unlock string to the anti-DoS characteristic
    pub async fn unlock(
        &self,
        peripheral: &dyn Peripheral,
        bindings: &CharacteristicBindings,
        code: &str,
    ) -> Result<(), ToyError> {
        let anti_dos = bindings.require(CharacteristicRole::AntiDos)?;
        peripheral.write(anti_dos, code.as_bytes(), false).await?;
        self.advance(ConnectionState::Unlocking);
        Ok(())
    }

    /// Enable notifications on DFU control, then on control
    pub async fn subscribe(
        &self,
        peripheral: &dyn Peripheral,
        bindings: &CharacteristicBindings,
    ) -> Result<(), ToyError> {
        let dfu_control = bindings.require(CharacteristicRole::DfuControl)?;
        let control = bindings.require(CharacteristicRole::Control)?;
        peripheral.subscribe(dfu_control).await?;
        peripheral.subscribe(control).await?;
        self.advance(ConnectionState::Subscribing);
        Ok(())
    }

    /// Start accepting commands
    pub fn mark_awake(&self) {
        self.advance(ConnectionState::Awake);
        info!("Toy handshake complete");
    }
}
