//! In-memory peripheral for driving `Toy` without Bluetooth.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sphero_transport::codec::encode_with_flags;
use sphero_transport::protocol::{flags, gatt};
use sphero_transport::{
    CharacteristicRole, Packet, PacketDecoder, Peripheral, PeripheralEvent, TransportError,
};
use sphero_toy::{Toy, ToyConfig};
use tokio::sync::{broadcast, watch};

pub const CONTROL: &str = gatt::API_V2_CHARACTERISTIC;
pub const DFU_CONTROL: &str = gatt::DFU_CONTROL_CHARACTERISTIC;
pub const DFU_INFO: &str = gatt::DFU_INFO_CHARACTERISTIC;
pub const ANTI_DOS: &str = gatt::ANTI_DOS_CHARACTERISTIC;

/// A peripheral call, as recorded by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Discover,
    Write {
        characteristic: String,
        data: Vec<u8>,
        with_response: bool,
    },
    Subscribe(String),
}

pub struct FakePeripheral {
    uuids: Vec<String>,
    events: broadcast::Sender<PeripheralEvent>,
    calls: Mutex<Vec<Call>>,
    control_writes: watch::Sender<usize>,
    auto_respond: AtomicBool,
    chunked: AtomicBool,
    delay: Mutex<Option<Duration>>,
    replies: Mutex<HashMap<(u8, u8), Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    refuse_connect: AtomicBool,
}

impl FakePeripheral {
    /// A toy exposing all four characteristics that answers every command
    pub fn sphero() -> Arc<Self> {
        Arc::new(Self::with_uuids(
            [CONTROL, DFU_CONTROL, DFU_INFO, ANTI_DOS]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ))
    }

    /// Like `sphero()` but without one characteristic
    pub fn without(role: CharacteristicRole) -> Arc<Self> {
        Arc::new(Self::with_uuids(
            CharacteristicRole::ALL
                .iter()
                .filter(|r| **r != role)
                .map(|r| r.uuid().to_string())
                .collect(),
        ))
    }

    fn with_uuids(uuids: Vec<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        let (control_writes, _) = watch::channel(0);
        Self {
            uuids,
            events,
            calls: Mutex::new(Vec::new()),
            control_writes,
            auto_respond: AtomicBool::new(true),
            chunked: AtomicBool::new(false),
            delay: Mutex::new(None),
            replies: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            refuse_connect: AtomicBool::new(false),
        }
    }

    // === Behaviour switches ===

    pub fn set_auto_respond(&self, on: bool) {
        self.auto_respond.store(on, Ordering::SeqCst);
    }

    /// Deliver responses one byte per event
    pub fn set_chunked(&self, on: bool) {
        self.chunked.store(on, Ordering::SeqCst);
    }

    /// Answer after `delay` instead of immediately
    pub fn set_response_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Response data (after the code byte) for a device/command pair
    pub fn set_reply(&self, device_id: u8, command_id: u8, data: &[u8]) {
        self.replies
            .lock()
            .insert((device_id, command_id), data.to_vec());
    }

    pub fn fail_writes_to(&self, characteristic: &str) {
        self.failing.lock().insert(characteristic.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn refuse_connect(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    // === Inspection ===

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn writes_to(&self, characteristic: &str) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Write {
                    characteristic: c,
                    data,
                    ..
                } if c == characteristic => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands written to control, decoded
    pub fn control_packets(&self) -> Vec<Packet> {
        let mut decoder = PacketDecoder::new();
        self.writes_to(CONTROL)
            .iter()
            .flat_map(|raw| decoder.feed(raw))
            .map(|outcome| outcome.expect("driver wrote a malformed frame"))
            .collect()
    }

    /// Wait until at least `n` writes to control were attempted
    pub async fn wait_for_control_writes(&self, n: usize) {
        let mut rx = self.control_writes.subscribe();
        rx.wait_for(|count| *count >= n)
            .await
            .expect("fake peripheral dropped");
    }

    // === Event injection ===

    pub fn emit(&self, event: PeripheralEvent) {
        let _ = self.events.send(event);
    }

    pub fn notify(&self, characteristic: &str) {
        self.emit(PeripheralEvent::Notify {
            characteristic: characteristic.to_string(),
            enabled: true,
        });
    }

    /// Bytes arriving on control
    pub fn read(&self, data: &[u8]) {
        self.emit(PeripheralEvent::Read {
            characteristic: CONTROL.to_string(),
            data: data.to_vec(),
            is_notification: true,
        });
    }

    /// A response frame with the given triple and payload (code byte included)
    pub fn respond(&self, device_id: u8, command_id: u8, sequence: u8, payload: &[u8]) {
        self.read(&encode_with_flags(
            flags::IS_RESPONSE,
            device_id,
            command_id,
            sequence,
            payload,
        ));
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn answer(&self, raw: &[u8]) {
        let Some(Ok(cmd)) = PacketDecoder::new().feed(raw).into_iter().next() else {
            return;
        };
        let mut payload = vec![0x00];
        if let Some(data) = self.replies.lock().get(&(cmd.device_id, cmd.command_id)) {
            payload.extend_from_slice(data);
        }
        let frame = encode_with_flags(
            flags::IS_RESPONSE,
            cmd.device_id,
            cmd.command_id,
            cmd.sequence,
            &payload,
        );
        let events: Vec<PeripheralEvent> = if self.chunked.load(Ordering::SeqCst) {
            frame
                .iter()
                .map(|b| PeripheralEvent::Read {
                    characteristic: CONTROL.to_string(),
                    data: vec![*b],
                    is_notification: true,
                })
                .collect()
        } else {
            vec![PeripheralEvent::Read {
                characteristic: CONTROL.to_string(),
                data: frame,
                is_notification: true,
            }]
        };

        let tx = self.events.clone();
        match *self.delay.lock() {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for event in events {
                        let _ = tx.send(event);
                    }
                });
            }
            None => {
                for event in events {
                    let _ = tx.send(event);
                }
            }
        }
    }
}

#[async_trait]
impl Peripheral for FakePeripheral {
    async fn connect(&self) -> Result<(), TransportError> {
        self.record(Call::Connect);
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        Ok(())
    }

    async fn discover_characteristics(&self) -> Result<Vec<String>, TransportError> {
        self.record(Call::Discover);
        Ok(self.uuids.clone())
    }

    async fn write(
        &self,
        characteristic: &str,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        self.record(Call::Write {
            characteristic: characteristic.to_string(),
            data: data.to_vec(),
            with_response,
        });
        let failing = self.failing.lock().contains(characteristic);
        if characteristic == CONTROL {
            self.control_writes.send_modify(|count| *count += 1);
        }
        if failing {
            return Err(TransportError::Write {
                characteristic: characteristic.to_string(),
                reason: "injected failure".into(),
            });
        }
        if characteristic == CONTROL && self.auto_respond.load(Ordering::SeqCst) {
            self.answer(data);
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: &str) -> Result<(), TransportError> {
        self.record(Call::Subscribe(characteristic.to_string()));
        if self.failing.lock().contains(characteristic) {
            return Err(TransportError::Subscribe {
                characteristic: characteristic.to_string(),
                reason: "injected failure".into(),
            });
        }
        // Confirmed subscriptions are reported like the BLE backend does
        self.notify(characteristic);
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> Option<String> {
        Some("SM-TEST".to_string())
    }
}

/// A toy over `fake` that has completed `start()`
pub async fn started_toy(fake: &Arc<FakePeripheral>) -> Toy {
    let toy = Toy::new(fake.clone(), ToyConfig::default()).expect("valid config");
    toy.start().await.expect("start");
    toy
}
