//! Read-only view orchestrators need into fleet state, without depending
//! directly on the health store or risk engine crates.
//!
//! Health and risk observe each other (risk's heartbeat-stability factor
//! wants the legacy status; health's summaries feed risk assessment), so a
//! direct crate dependency either way would be cyclic. Orchestration binds
//! both sides through this trait instead; the service-wiring layer is the
//! only place that implements it.

use fleet_common::{FactoryId, LegacyFactoryStatus, RiskLevel};

pub trait FleetStatusView: Send + Sync {
    /// `None` if the factory is unknown to the view.
    fn legacy_status(&self, factory_id: &FactoryId) -> Option<LegacyFactoryStatus>;

    /// `None` if no risk assessment has run yet for this factory.
    fn risk_level(&self, factory_id: &FactoryId) -> Option<RiskLevel>;

    fn all_factory_ids(&self) -> Vec<FactoryId>;
}
