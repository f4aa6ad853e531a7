//! Shared types for the fleet health monitor.
//!
//! This crate carries nothing domain-specific beyond identifiers, wire/
//! persisted event shapes, status enums, and the error taxonomy every other
//! crate in the workspace builds on. It has no dependency on any other
//! `fleet-*` crate.

pub mod counter;
pub mod error;
pub mod events;
pub mod ids;
pub mod status;

pub use counter::AtomicCounter;
pub use error::{FleetError, FleetResult};
pub use events::*;
pub use ids::{FactoryId, SensorId};
pub use status::{FactoryStatus, LegacyFactoryStatus, RiskLevel, SensorStatus};
