//! Toy worker
//!
//! One tokio task per started toy. It owns the command queue, the packet
//! decoder and the characteristic bindings, and serializes every event that
//! touches them:
//!
//! ```text
//!   Toy::enqueue ──mpsc──┐
//!   peripheral events ───┼──► select! ──► CommandQueue ──► peripheral.write
//!   executing deadline ──┘
//! ```
//!
//! A response and a timeout for the same command cannot both win: whichever
//! the loop sees first clears the executing slot, the other finds it empty.
//!
//! Control notifications re-wake the toy only after `MarkAwake`. Events that
//! were already delivered when it arrives, such as the confirmations of the
//! startup subscriptions, are handled first.

use sphero_transport::{
    BoxedPeripheral, CharacteristicRole, CommandFactory, CommandQueue, DecodeOutcome,
    PacketDecoder, PeripheralEvent, QueueError, QueueItem, Resolution, Wake,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::lifecycle::CharacteristicBindings;

/// Requests from the toy handle
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Enqueue(QueueItem),
    /// The handshake is done; later control notifications re-wake the toy
    MarkAwake,
}

pub(crate) struct Worker {
    peripheral: BoxedPeripheral,
    bindings: CharacteristicBindings,
    queue: CommandQueue,
    decoder: PacketDecoder,
    factory: CommandFactory,
    awake: bool,
    dfu_ack: u8,
}

impl Worker {
    pub(crate) fn new(
        peripheral: BoxedPeripheral,
        bindings: CharacteristicBindings,
        queue: CommandQueue,
        factory: CommandFactory,
        dfu_ack: u8,
    ) -> Self {
        Self {
            peripheral,
            bindings,
            queue,
            decoder: PacketDecoder::new(),
            factory,
            awake: false,
            dfu_ack,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<WorkerMessage>,
        mut events: broadcast::Receiver<PeripheralEvent>,
    ) {
        debug!("Toy worker started");
        loop {
            let deadline = self.queue.deadline();
            tokio::select! {
                msg = requests.recv() => match msg {
                    Some(WorkerMessage::Enqueue(item)) => {
                        self.queue.push(item);
                        self.pump().await;
                    }
                    Some(WorkerMessage::MarkAwake) => {
                        if !self.drain(&mut events).await {
                            break;
                        }
                        self.awake = true;
                    }
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Dropped {} peripheral events", n);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Peripheral event stream closed");
                        break;
                    }
                },
                _ = wait_until(deadline) => {
                    if self.queue.expire(Instant::now()) {
                        self.pump().await;
                    }
                }
            }
        }
        self.queue.close();
        debug!("Toy worker stopped");
    }

    /// Handle every event already delivered. Returns false once the stream
    /// has closed.
    async fn drain(&mut self, events: &mut broadcast::Receiver<PeripheralEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(event) => self.handle_event(event).await,
                Err(TryRecvError::Lagged(n)) => warn!("Dropped {} peripheral events", n),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => {
                    debug!("Peripheral event stream closed");
                    return false;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: PeripheralEvent) {
        let role = self.bindings.role_of(event.characteristic());
        match (event, role) {
            (PeripheralEvent::Read { data, .. }, Some(CharacteristicRole::Control)) => {
                for outcome in self.decoder.feed(&data) {
                    self.on_outcome(outcome).await;
                }
            }
            (PeripheralEvent::Notify { .. }, Some(CharacteristicRole::Control)) => {
                self.rewake().await;
            }
            (PeripheralEvent::Notify { .. }, Some(CharacteristicRole::DfuControl)) => {
                self.ack_dfu().await;
            }
            (event, _) => debug!("Ignoring event on {}", event.characteristic()),
        }
    }

    async fn on_outcome(&mut self, outcome: DecodeOutcome) {
        match outcome {
            Ok(packet) => {
                if self.queue.resolve(packet) != Resolution::Unsolicited {
                    self.pump().await;
                }
            }
            Err(e) => warn!("Discarding malformed packet: {}", e),
        }
    }

    /// The toy reported a state change on the control channel; wake it again
    async fn rewake(&mut self) {
        if !self.awake {
            debug!("Control notification before wake-up, not re-waking");
            return;
        }
        let Some(control) = self.bindings.get(CharacteristicRole::Control) else {
            return;
        };
        let pending = self.queue.enqueue(control, self.factory.build(&Wake));
        tokio::spawn(async move {
            match pending.await {
                Ok(_) => debug!("Re-wake acknowledged"),
                Err(e) => warn!("Re-wake failed: {}", e),
            }
        });
        self.pump().await;
    }

    async fn ack_dfu(&self) {
        let Some(dfu_control) = self.bindings.get(CharacteristicRole::DfuControl) else {
            return;
        };
        debug!("Acknowledging DFU control notification");
        if let Err(e) = self
            .peripheral
            .write(dfu_control, &[self.dfu_ack], false)
            .await
        {
            warn!("DFU acknowledgment failed: {}", e);
        }
    }

    /// Write the next backlog item if nothing is executing.
    ///
    /// A failed write fails that item and moves on to the next.
    async fn pump(&mut self) {
        while let Some(write) = self.queue.dispatch(Instant::now()) {
            match self
                .peripheral
                .write(&write.characteristic, &write.bytes, false)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    warn!("Write of command #{} failed: {}", write.sequence, e);
                    self.queue.fail_executing(QueueError::Transport(e));
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
