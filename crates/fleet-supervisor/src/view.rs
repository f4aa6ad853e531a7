//! [`FleetStatusView`] implementation backing the failover/recovery
//! orchestrators with the supervisor's own cached aggregator status and
//! risk assessments, without either orchestrator depending on
//! `fleet-health` or `fleet-risk` directly.

use dashmap::DashMap;
use fleet_common::{FactoryId, LegacyFactoryStatus, RiskLevel};
use fleet_health::{FactoryHealthAggregator, SensorHealthStore};
use fleet_resilience::FleetStatusView;

pub struct SupervisorView<'a> {
    pub health_store: &'a SensorHealthStore,
    pub aggregator: &'a FactoryHealthAggregator,
    pub risk_cache: &'a DashMap<FactoryId, RiskLevel>,
}

impl FleetStatusView for SupervisorView<'_> {
    fn legacy_status(&self, factory_id: &FactoryId) -> Option<LegacyFactoryStatus> {
        self.aggregator.cached_status(factory_id).map(|s| s.to_legacy())
    }

    fn risk_level(&self, factory_id: &FactoryId) -> Option<RiskLevel> {
        self.risk_cache.get(factory_id).map(|v| *v)
    }

    fn all_factory_ids(&self) -> Vec<FactoryId> {
        self.health_store.factory_ids()
    }
}
