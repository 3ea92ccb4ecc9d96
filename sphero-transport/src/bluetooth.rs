//! Bluetooth GATT backend (btleplug)
//!
//! Adapts a btleplug peripheral to the `Peripheral` contract:
//!
//! - value notifications become `PeripheralEvent::Read`
//! - a confirmed subscription emits `PeripheralEvent::Notify`
//!
//! and scans for toys by advertised name prefix.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::discovery::{match_advertisement, matches_prefix};
use crate::error::TransportError;
use crate::types::PeripheralEvent;
use crate::Peripheral;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_SIZE: usize = 64;

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        TransportError::Bluetooth(e.to_string())
    }
}

fn simple_uuid(uuid: impl Display) -> String {
    uuid.to_string().replace('-', "").to_ascii_lowercase()
}

/// A BLE peripheral reached through btleplug
pub struct BluetoothPeripheral {
    inner: PlatformPeripheral,
    local_name: Option<String>,
    characteristics: Mutex<HashMap<String, Characteristic>>,
    events: broadcast::Sender<PeripheralEvent>,
    notifications_started: AtomicBool,
}

impl BluetoothPeripheral {
    pub fn new(inner: PlatformPeripheral, local_name: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner,
            local_name,
            characteristics: Mutex::new(HashMap::new()),
            events,
            notifications_started: AtomicBool::new(false),
        }
    }

    /// Bluetooth device address
    pub fn address(&self) -> String {
        self.inner.address().to_string()
    }

    fn lookup(&self, uuid: &str) -> Result<Characteristic, TransportError> {
        self.characteristics
            .lock()
            .get(uuid)
            .cloned()
            .ok_or_else(|| TransportError::UnknownCharacteristic(uuid.to_string()))
    }

    /// Forward the btleplug notification stream into the event channel (once)
    async fn start_notifications(&self) -> Result<(), TransportError> {
        if self.notifications_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut stream = self.inner.notifications().await?;
        let tx = self.events.clone();
        tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                // No receivers is fine; events are dropped until someone listens
                let _ = tx.send(PeripheralEvent::Read {
                    characteristic: simple_uuid(notification.uuid),
                    data: notification.value,
                    is_notification: true,
                });
            }
            debug!("BLE notification stream ended");
        });
        Ok(())
    }
}

#[async_trait]
impl Peripheral for BluetoothPeripheral {
    async fn connect(&self) -> Result<(), TransportError> {
        self.inner
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))
    }

    async fn discover_characteristics(&self) -> Result<Vec<String>, TransportError> {
        self.inner
            .discover_services()
            .await
            .map_err(|e| TransportError::Discovery(e.to_string()))?;

        let mut map = self.characteristics.lock();
        map.clear();
        for c in self.inner.characteristics() {
            map.insert(simple_uuid(c.uuid), c);
        }
        Ok(map.keys().cloned().collect())
    }

    async fn write(
        &self,
        characteristic: &str,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        let c = self.lookup(characteristic)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.inner
            .write(&c, data, write_type)
            .await
            .map_err(|e| TransportError::Write {
                characteristic: characteristic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, characteristic: &str) -> Result<(), TransportError> {
        let c = self.lookup(characteristic)?;
        self.start_notifications().await?;
        self.inner
            .subscribe(&c)
            .await
            .map_err(|e| TransportError::Subscribe {
                characteristic: characteristic.to_string(),
                reason: e.to_string(),
            })?;
        let _ = self.events.send(PeripheralEvent::Notify {
            characteristic: characteristic.to_string(),
            enabled: true,
        });
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> Option<String> {
        self.local_name.clone()
    }
}

/// A toy found during a scan
pub struct DiscoveredToy {
    /// Advertised local name (e.g. `SM-1A2B`)
    pub name: String,
    /// Model name from the known toys table
    pub model: &'static str,
    pub address: String,
    pub peripheral: BluetoothPeripheral,
}

/// Scans the first Bluetooth adapter for toys
pub struct BluetoothDiscovery {
    adapter: Adapter,
}

impl BluetoothDiscovery {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Bluetooth("No Bluetooth adapter found".into()))?;
        Ok(Self { adapter })
    }

    /// Scan for `window`, then return peripherals whose name matches a prefix
    pub async fn find_toys<S: AsRef<str>>(
        &self,
        window: Duration,
        prefixes: &[S],
    ) -> Result<Vec<DiscoveredToy>, TransportError> {
        info!("Scanning devices for {:?}...", window);
        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(window).await;
        self.adapter.stop_scan().await?;

        let mut toys = Vec::new();
        for p in self.adapter.peripherals().await? {
            let Some(props) = p.properties().await? else {
                continue;
            };
            let Some(name) = props.local_name else {
                continue;
            };
            if !matches_prefix(&name, prefixes) {
                continue;
            }
            let model = match_advertisement(&name).map_or("Unknown toy", |toy| toy.name);
            let address = p.address().to_string();
            info!("Detected {} ({}): {}", model, name, address);
            toys.push(DiscoveredToy {
                name: name.clone(),
                model,
                address,
                peripheral: BluetoothPeripheral::new(p, Some(name)),
            });
        }
        info!("Done scanning devices, found {}", toys.len());
        Ok(toys)
    }
}
