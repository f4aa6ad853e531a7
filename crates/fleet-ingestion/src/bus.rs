//! Abstract event bus: the ingestion loop's only window onto the outside
//! world. No concrete transport (Kafka, NATS, ...) is a dependency of this
//! crate; an in-memory implementation ships for tests and standalone runs.

use async_trait::async_trait;
use fleet_common::FleetResult;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// One bus record: a topic name plus its raw JSON-encoded payload.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

/// Poll outcome, mirroring what a real consumer client distinguishes.
pub enum PollOutcome {
    Message(BusMessage),
    /// No message arrived within the poll timeout; not an error.
    Idle,
    /// End of partition/topic reached; not an error, keep polling.
    PartitionEof,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn poll(&self, timeout: Duration) -> FleetResult<PollOutcome>;
    async fn publish(&self, topic: &str, payload: String) -> FleetResult<()>;
}

/// In-memory bus backed by an mpsc channel. Tests push messages in with
/// [`InMemoryBus::send`]; `poll` drains them. Published messages (e.g.
/// `sensor-at-risk`) are captured for assertions rather than routed anywhere.
pub struct InMemoryBus {
    inbound_tx: mpsc::UnboundedSender<BusMessage>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<BusMessage>>,
    published: Mutex<Vec<BusMessage>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx: tx,
            inbound_rx: Mutex::new(rx),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn send(&self, topic: impl Into<String>, payload: impl Into<String>) {
        let _ = self.inbound_tx.send(BusMessage {
            topic: topic.into(),
            payload: payload.into(),
        });
    }

    pub async fn published_messages(&self) -> Vec<BusMessage> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn poll(&self, timeout: Duration) -> FleetResult<PollOutcome> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(PollOutcome::Message(msg)),
            Ok(None) => Ok(PollOutcome::PartitionEof),
            Err(_elapsed) => Ok(PollOutcome::Idle),
        }
    }

    async fn publish(&self, topic: &str, payload: String) -> FleetResult<()> {
        self.published.lock().await.push(BusMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}
