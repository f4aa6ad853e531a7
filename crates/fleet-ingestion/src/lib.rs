//! Telemetry ingestion and routing: the bus consumer that multiplexes
//! heartbeat, reading, failure and restart events into the health store and
//! risk engine, decoding each message exactly once at the boundary.

pub mod bus;
pub mod decode;
pub mod engine;
pub mod mailbox;

pub use bus::{BusMessage, EventBus, InMemoryBus, PollOutcome};
pub use decode::{decode_message, DecodeOutcome};
pub use engine::{IngestionEngine, IngestionMetrics};
pub use mailbox::HeartbeatQueue;
