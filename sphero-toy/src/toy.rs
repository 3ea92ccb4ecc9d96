//! Toy handle
//!
//! `Toy` drives the startup handshake, then turns high-level actions into
//! queued commands on the control characteristic.

use std::time::Duration;

use parking_lot::Mutex;
use sphero_transport::{
    BatteryVoltage, BoxedPeripheral, CharacteristicRole, Command, CommandFactory, CommandQueue,
    DeepSleep, Drive, DriveFlag, Echo, EchoReply, FirmwareVersion, Packet, PendingCommand,
    QueryBatteryVoltage, QueryBootloaderVersion, QueryMainAppVersion, QueueItem, Sleep,
    ToyCommand, ToyResponse, Wake,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ToyConfig;
use crate::error::ToyError;
use crate::lifecycle::{CharacteristicBindings, ConnectionState, Lifecycle};
use crate::worker::{Worker, WorkerMessage};

/// Channel to a running worker
struct Link {
    requests: mpsc::UnboundedSender<WorkerMessage>,
    bindings: CharacteristicBindings,
}

/// A Sphero Mini reached through a `Peripheral`
///
/// Nothing is sent until `start()` has completed the handshake; commands
/// issued earlier are dropped and return `None`.
pub struct Toy {
    peripheral: BoxedPeripheral,
    config: ToyConfig,
    factory: CommandFactory,
    lifecycle: Lifecycle,
    /// Handed to the worker on `start()`
    queue: Mutex<Option<CommandQueue>>,
    link: Mutex<Option<Link>>,
}

impl Toy {
    /// Create a toy handle. Fails for an unusable config or queue mode.
    pub fn new(peripheral: BoxedPeripheral, config: ToyConfig) -> Result<Self, ToyError> {
        config.validate()?;
        let queue = CommandQueue::new(config.queue_mode, config.command_timeout())?;
        Ok(Self {
            peripheral,
            config,
            factory: CommandFactory::new(),
            lifecycle: Lifecycle::new(),
            queue: Mutex::new(Some(queue)),
            link: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn is_started(&self) -> bool {
        self.state() == ConnectionState::Awake
    }

    pub fn config(&self) -> &ToyConfig {
        &self.config
    }

    /// Advertised name of the underlying peripheral
    pub fn name(&self) -> Option<String> {
        self.peripheral.name()
    }

    /// Run the handshake and wake the toy.
    ///
    /// Only one start is attempted per `Toy`. A transport failure in any step
    /// aborts the start and is returned; so is a failure of the first wake.
    pub async fn start(&self) -> Result<(), ToyError> {
        let queue = self.queue.lock().take().ok_or(ToyError::AlreadyStarted)?;
        let peripheral = self.peripheral.as_ref();

        self.lifecycle.connect(peripheral).await?;
        let bindings = self.lifecycle.bind_services(peripheral).await?;
        self.lifecycle
            .unlock(peripheral, &bindings, &self.config.unlock_code)
            .await?;

        // Attach before subscribing so no notification is missed
        let events = self.peripheral.subscribe_events();
        let (requests, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(
            self.peripheral.clone(),
            bindings.clone(),
            queue,
            self.factory.clone(),
            self.config.dfu_ack,
        );
        tokio::spawn(worker.run(rx, events));
        *self.link.lock() = Some(Link {
            requests,
            bindings: bindings.clone(),
        });

        if let Err(e) = self.lifecycle.subscribe(peripheral, &bindings).await {
            // Dropping the sender stops the worker
            self.link.lock().take();
            return Err(e);
        }

        // Subscription confirmations already delivered are handled before re-waking is enabled
        if let Some(link) = self.link.lock().as_ref() {
            let _ = link.requests.send(WorkerMessage::MarkAwake);
        }
        self.lifecycle.mark_awake();
        let wake = self.wake().ok_or(ToyError::NotStarted)?;
        wake.await?;
        info!(
            "{} is awake",
            self.name().unwrap_or_else(|| "Toy".to_string())
        );
        Ok(())
    }

    /// Queue a command for a characteristic.
    ///
    /// Returns `None` (and does nothing) before the handshake completes.
    pub fn enqueue(&self, characteristic: &str, command: Command) -> Option<PendingCommand> {
        if !self.is_started() {
            debug!("Dropping {}: toy not started", command.correlation());
            return None;
        }
        let link = self.link.lock();
        let link = link.as_ref()?;
        let (item, pending) = QueueItem::new(characteristic, command);
        if link.requests.send(WorkerMessage::Enqueue(item)).is_err() {
            // The item is dropped with the message, so `pending` resolves to Closed
            warn!("Toy worker has stopped");
        }
        Some(pending)
    }

    /// Build `cmd` with the next sequence number and queue it on control
    pub fn send<C: ToyCommand>(&self, cmd: &C) -> Option<PendingCommand> {
        // Check first so a dropped command does not consume a sequence number
        if !self.is_started() {
            debug!("Dropping command: toy not started");
            return None;
        }
        let control = self.control()?;
        self.enqueue(&control, self.factory.build(cmd))
    }

    fn control(&self) -> Option<String> {
        self.link
            .lock()
            .as_ref()
            .and_then(|link| link.bindings.get(CharacteristicRole::Control))
            .map(str::to_string)
    }

    /// Send `cmd`, await it and parse the reply
    async fn request<C: ToyCommand, R: ToyResponse>(&self, cmd: &C) -> Result<R, ToyError> {
        let packet = self.send(cmd).ok_or(ToyError::NotStarted)?.await?;
        Ok(R::parse(&packet)?)
    }

    // === Power ===

    pub fn wake(&self) -> Option<PendingCommand> {
        self.send(&Wake)
    }

    pub fn sleep(&self) -> Option<PendingCommand> {
        self.send(&Sleep)
    }

    /// Deep sleep drops the BLE connection
    pub fn deep_sleep(&self) -> Option<PendingCommand> {
        self.send(&DeepSleep)
    }

    pub async fn battery_voltage(&self) -> Result<BatteryVoltage, ToyError> {
        self.request(&QueryBatteryVoltage).await
    }

    // === Driving ===

    /// Drive at `speed` towards `heading` degrees
    pub fn roll(&self, speed: u8, heading: u16, flags: &[DriveFlag]) -> Option<PendingCommand> {
        self.send(&Drive::new(speed, heading, flags))
    }

    /// Keep driving for `duration`, then stop.
    ///
    /// Drive commands are sent back to back, each after the previous one
    /// completed, until the duration has elapsed; then one zero-speed drive
    /// with the same heading is sent. Returns the stop command's response.
    pub async fn roll_time(
        &self,
        speed: u8,
        heading: u16,
        duration: Duration,
        flags: &[DriveFlag],
    ) -> Result<Packet, ToyError> {
        let drive = Drive::new(speed, heading, flags);
        let until = Instant::now() + duration;
        debug!("Driving for {:?}", duration);

        let mut sent = 0u32;
        loop {
            self.send(&drive).ok_or(ToyError::NotStarted)?.await?;
            sent += 1;
            if Instant::now() >= until {
                break;
            }
        }

        debug!("Stopping after {} drive commands", sent);
        let packet = self.send(&drive.stop()).ok_or(ToyError::NotStarted)?.await?;
        Ok(packet)
    }

    // === System info ===

    pub async fn main_app_version(&self) -> Result<FirmwareVersion, ToyError> {
        self.request(&QueryMainAppVersion).await
    }

    pub async fn bootloader_version(&self) -> Result<FirmwareVersion, ToyError> {
        self.request(&QueryBootloaderVersion).await
    }

    /// Round-trip `data` through the toy's API processor
    pub async fn echo(&self, data: &[u8]) -> Result<Vec<u8>, ToyError> {
        let reply: EchoReply = self
            .request(&Echo {
                data: data.to_vec(),
            })
            .await?;
        Ok(reply.data)
    }
}
