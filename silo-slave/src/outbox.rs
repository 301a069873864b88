//! Outgoing message queue
//!
//! Handlers never touch the control socket. They queue messages here and a
//! single writer task drains the queue, so frames never interleave.

use silo_common::framing::CommandIndex;
use silo_common::protocol::SlaveMessage;
use tokio::sync::mpsc;

/// A queued message and the command index it answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub index: CommandIndex,
    pub message: SlaveMessage,
}

/// Cloneable sender half of the outgoing queue
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    /// Create a queue and the receiver the writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a response to `index`; false once the writer is gone
    pub fn send(&self, index: CommandIndex, message: SlaveMessage) -> bool {
        self.tx.send(Outgoing { index, message }).is_ok()
    }

    /// Queue an unsolicited message
    pub fn push(&self, message: SlaveMessage) -> bool {
        self.send(CommandIndex::UNSOLICITED, message)
    }

    /// Whether the writer task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
