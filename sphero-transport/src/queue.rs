//! Command queue
//!
//! Serializes command execution: a FIFO backlog plus a single executing slot.
//! The queue itself does no I/O. Its owner (the toy worker) feeds it events
//! and performs the writes it hands out:
//!
//! ```text
//!   push ──► backlog ──dispatch──► executing ──resolve(packet)──► Ok(packet)
//!                                      │
//!                                      ├──resolve(mismatch)──┐
//!                                      ├──expire(deadline)───┼──► Err(QueueError), slot cleared
//!                                      └──fail(write error)──┘
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::codec::Packet;
use crate::command::Command;
use crate::error::QueueError;
use crate::protocol::timing;

/// Queueing policy. Only `Queue` is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Write immediately without correlation (not implemented)
    NoQueue,
    /// FIFO, one in flight, fail-and-advance on error
    #[default]
    Queue,
    /// Like `Queue` but retries failed commands (not implemented)
    QueueTryAgain,
    /// Like `Queue` but resolves failed commands as success (not implemented)
    QueueIgnoreError,
}

impl QueueMode {
    pub fn is_implemented(self) -> bool {
        matches!(self, QueueMode::Queue)
    }
}

type Completion = oneshot::Sender<Result<Packet, QueueError>>;

/// A command waiting for, or undergoing, execution
#[derive(Debug)]
pub struct QueueItem {
    characteristic: String,
    command: Command,
    done: Completion,
    deadline: Option<Instant>,
}

impl QueueItem {
    /// Create an item and the handle its caller awaits
    pub fn new(characteristic: impl Into<String>, command: Command) -> (Self, PendingCommand) {
        let (done, rx) = oneshot::channel();
        let pending = PendingCommand {
            sequence: command.sequence(),
            rx,
        };
        let item = Self {
            characteristic: characteristic.into(),
            command,
            done,
            deadline: None,
        };
        (item, pending)
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn characteristic(&self) -> &str {
        &self.characteristic
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn complete(self, result: Result<Packet, QueueError>) {
        // The caller may have stopped waiting
        let _ = self.done.send(result);
    }
}

/// Completion handle for an enqueued command
#[derive(Debug)]
pub struct PendingCommand {
    sequence: u8,
    rx: oneshot::Receiver<Result<Packet, QueueError>>,
}

impl PendingCommand {
    /// Sequence number of the command this handle tracks
    pub fn sequence(&self) -> u8 {
        self.sequence
    }
}

impl Future for PendingCommand {
    type Output = Result<Packet, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(QueueError::Closed)))
    }
}

/// Bytes the owner must write for a newly executing command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundWrite {
    pub characteristic: String,
    pub bytes: Vec<u8>,
    pub sequence: u8,
}

/// What an inbound packet did to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Answered the executing command
    Completed,
    /// Did not match; the executing command failed
    Mismatched,
    /// Nothing was executing
    Unsolicited,
}

/// FIFO backlog plus one executing slot
#[derive(Debug)]
pub struct CommandQueue {
    backlog: VecDeque<QueueItem>,
    executing: Option<QueueItem>,
    timeout: Duration,
}

impl CommandQueue {
    /// Create a queue. Fails for modes that are not implemented.
    pub fn new(mode: QueueMode, timeout: Duration) -> Result<Self, QueueError> {
        if !mode.is_implemented() {
            return Err(QueueError::UnsupportedMode(mode));
        }
        Ok(Self {
            backlog: VecDeque::new(),
            executing: None,
            timeout,
        })
    }

    /// Append an item to the backlog
    pub fn push(&mut self, item: QueueItem) {
        debug!(
            "Queued {} ({} waiting)",
            item.command.correlation(),
            self.backlog.len()
        );
        self.backlog.push_back(item);
    }

    /// Build an item, append it and return its handle
    pub fn enqueue(&mut self, characteristic: impl Into<String>, command: Command) -> PendingCommand {
        let (item, pending) = QueueItem::new(characteristic, command);
        self.push(item);
        pending
    }

    /// Promote the oldest backlog item if nothing is executing.
    ///
    /// Arms the item's deadline at `now + timeout` and returns the write
    /// the owner must issue.
    pub fn dispatch(&mut self, now: Instant) -> Option<OutboundWrite> {
        if self.executing.is_some() {
            return None;
        }
        let mut item = self.backlog.pop_front()?;
        item.deadline = Some(now + self.timeout);
        let write = OutboundWrite {
            characteristic: item.characteristic.clone(),
            bytes: item.command.raw().to_vec(),
            sequence: item.command.sequence(),
        };
        debug!("Writing command {}", item.command.correlation());
        self.executing = Some(item);
        Some(write)
    }

    /// Match an inbound packet against the executing command
    pub fn resolve(&mut self, packet: Packet) -> Resolution {
        let Some(item) = self.executing.as_ref() else {
            debug!("Packet received but nothing executing: {}", packet.correlation());
            return Resolution::Unsolicited;
        };

        if item.command.matches(&packet) {
            debug!("Response for {}", packet.correlation());
            if let Some(item) = self.executing.take() {
                item.complete(Ok(packet));
            }
            Resolution::Completed
        } else {
            let err = QueueError::Mismatch {
                expected: item.command.correlation(),
                actual: packet.correlation(),
            };
            warn!("{}", err);
            self.fail_executing(err);
            Resolution::Mismatched
        }
    }

    /// Fail the executing command if its deadline has passed
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if deadline <= now => {
                warn!("Command timed out after {:?}", self.timeout);
                self.fail_executing(QueueError::Timeout(self.timeout))
            }
            _ => false,
        }
    }

    /// Queue error policy: fail the executing command and clear the slot.
    ///
    /// The command is not retried. Returns false if nothing was executing.
    pub fn fail_executing(&mut self, error: QueueError) -> bool {
        match self.executing.take() {
            Some(item) => {
                item.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail everything, executing and waiting
    pub fn close(&mut self) {
        self.fail_executing(QueueError::Closed);
        for item in self.backlog.drain(..) {
            item.complete(Err(QueueError::Closed));
        }
    }

    /// Deadline of the executing command
    pub fn deadline(&self) -> Option<Instant> {
        self.executing.as_ref().and_then(|item| item.deadline)
    }

    pub fn executing(&self) -> Option<&Command> {
        self.executing.as_ref().map(|item| &item.command)
    }

    pub fn is_idle(&self) -> bool {
        self.executing.is_none()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self {
            backlog: VecDeque::new(),
            executing: None,
            timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
        }
    }
}
