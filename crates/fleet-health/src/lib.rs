//! Sensor and factory health tracking: the live state store every other
//! subsystem reads from or reacts to.

pub mod aggregator;
pub mod store;

pub use aggregator::{FactoryHealthAggregator, HealthThresholds};
pub use store::{FactorySummary, SensorHealthStore, SensorRecord, TransitionOutcome};
