//! Failover and recovery orchestration, and the PMS RPC port they both call
//! through.
//!
//! Deliberately depends on neither `fleet-health` nor `fleet-risk`: both
//! sides would otherwise end up depending on each other through here. The
//! [`view::FleetStatusView`] trait is the seam; the service-wiring layer
//! supplies the implementation backed by both crates' state.

pub mod circuit;
pub mod failover;
pub mod pms;
pub mod recovery;
pub mod view;

pub use circuit::CircuitBreaker;
pub use failover::{FailoverCallback, FailoverOrchestrator, FailoverOutcome};
pub use pms::{MockPms, PmsClient, PmsPort, PmsResponse};
pub use recovery::{RecoveryCallback, RecoveryOrchestrator, RecoveryOutcome};
pub use view::FleetStatusView;
