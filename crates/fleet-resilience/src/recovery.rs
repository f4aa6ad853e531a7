//! Recovery orchestration: promotes a factory back to healthy once it has
//! strung together enough consecutive healthy ticks.

use crate::pms::PmsClient;
use chrono::Utc;
use dashmap::DashSet;
use fleet_common::{FactoryId, FactoryStatus, FailoverEvent, FleetResult, LegacyFactoryStatus};
use fleet_persistence::{FactoryStatusDoc, PersistencePort};
use std::sync::Arc;

const RECOVERY_CONSECUTIVE_HEALTHY_THRESHOLD: u32 = 5;

struct RecoveringGuard<'a> {
    set: &'a DashSet<FactoryId>,
    factory_id: FactoryId,
}

impl<'a> RecoveringGuard<'a> {
    fn acquire(set: &'a DashSet<FactoryId>, factory_id: FactoryId) -> Option<Self> {
        if !set.insert(factory_id.clone()) {
            return None;
        }
        Some(Self { set, factory_id })
    }
}

impl Drop for RecoveringGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.factory_id);
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub factory_id: FactoryId,
    pub previous_status: LegacyFactoryStatus,
}

pub type RecoveryCallback = Arc<dyn Fn(&RecoveryOutcome) + Send + Sync>;

pub struct RecoveryOrchestrator {
    recovering: DashSet<FactoryId>,
    callbacks: parking_lot::RwLock<Vec<RecoveryCallback>>,
    consecutive_healthy_threshold: u32,
}

impl Default for RecoveryOrchestrator {
    fn default() -> Self {
        Self::new(RECOVERY_CONSECUTIVE_HEALTHY_THRESHOLD)
    }
}

impl RecoveryOrchestrator {
    pub fn new(consecutive_healthy_threshold: u32) -> Self {
        Self {
            recovering: DashSet::new(),
            callbacks: parking_lot::RwLock::new(Vec::new()),
            consecutive_healthy_threshold,
        }
    }

    pub fn on_recovery(&self, callback: RecoveryCallback) {
        self.callbacks.write().push(callback);
    }

    /// Whether `factory_id` should be handed to [`Self::handle`]: not
    /// already `UP`, `consecutive_healthy` has reached the configured
    /// threshold (default 5, per §6 of the external interface), and
    /// `sensor_status` — the factory's canonical status derived directly
    /// from current sensor counts, not the cached legacy view — actually
    /// maps to `UP`. The heartbeat counter alone can't distinguish a
    /// genuinely recovered factory from one that's still failing sensor
    /// checks but hasn't missed a heartbeat; this keeps recovery from
    /// flipping a sensor-DOWN factory to UP just because heartbeats kept
    /// arriving.
    pub fn check(
        &self,
        current_status: LegacyFactoryStatus,
        consecutive_healthy: u32,
        sensor_status: FactoryStatus,
    ) -> bool {
        current_status != LegacyFactoryStatus::Up
            && consecutive_healthy >= self.consecutive_healthy_threshold
            && sensor_status.to_legacy() == LegacyFactoryStatus::Up
    }

    pub async fn handle(
        &self,
        factory_id: &FactoryId,
        previous_status: LegacyFactoryStatus,
        pms: &PmsClient,
        persistence: &dyn PersistencePort,
    ) -> FleetResult<Option<RecoveryOutcome>> {
        let Some(_guard) = RecoveringGuard::acquire(&self.recovering, factory_id.clone()) else {
            tracing::info!(factory = %factory_id, "recovery already in progress, skipping");
            return Ok(None);
        };

        persistence.reset_missed_heartbeats(factory_id).await?;
        persistence.reset_consecutive_healthy(factory_id).await?;

        let mut doc = persistence
            .get_latest_factory_status(factory_id)
            .await?
            .unwrap_or_else(|| FactoryStatusDoc {
                factory_id: factory_id.clone(),
                status: FactoryStatus::Operational,
                legacy_status: LegacyFactoryStatus::Up,
                health_percentage: 100.0,
                ok: 0,
                warning: 0,
                failed: 0,
                total: 0,
                missed_heartbeats: 0,
                consecutive_healthy: 0,
                updated_at: Utc::now(),
            });
        doc.status = FactoryStatus::Operational;
        doc.legacy_status = LegacyFactoryStatus::Up;
        doc.missed_heartbeats = 0;
        doc.consecutive_healthy = 0;
        doc.updated_at = Utc::now();
        persistence.upsert_factory_health(doc).await?;

        persistence
            .append_event(FailoverEvent {
                factory_id: factory_id.clone(),
                reason: format!("Factory recovered from {previous_status:?}"),
                target: None,
                timestamp: Utc::now(),
            })
            .await?;

        pms.report_with_retry(factory_id, LegacyFactoryStatus::Up, "recovery")
            .await;

        let outcome = RecoveryOutcome {
            factory_id: factory_id.clone(),
            previous_status,
        };

        for callback in self.callbacks.read().iter() {
            callback(&outcome);
        }

        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pms::MockPms;
    use fleet_persistence::InMemoryPersistence;

    #[test]
    fn check_requires_not_up_and_enough_consecutive_healthy() {
        let orchestrator = RecoveryOrchestrator::new(5);
        assert!(!orchestrator.check(LegacyFactoryStatus::Up, 10, FactoryStatus::Operational));
        assert!(!orchestrator.check(LegacyFactoryStatus::Down, 4, FactoryStatus::Operational));
        assert!(orchestrator.check(LegacyFactoryStatus::Down, 5, FactoryStatus::Operational));
        assert!(orchestrator.check(LegacyFactoryStatus::Degraded, 6, FactoryStatus::Operational));
    }

    #[test]
    fn check_refuses_to_recover_a_factory_whose_sensors_are_still_down() {
        let orchestrator = RecoveryOrchestrator::new(5);
        // Consecutive healthy heartbeats alone never clear a factory whose
        // sensors are still reporting failed.
        assert!(!orchestrator.check(LegacyFactoryStatus::Down, 5, FactoryStatus::Down));
        assert!(!orchestrator.check(LegacyFactoryStatus::Down, 50, FactoryStatus::Critical));
    }

    #[tokio::test]
    async fn handle_transitions_to_up_and_resets_counters() {
        let orchestrator = RecoveryOrchestrator::new(5);
        let pms = PmsClient::new(Box::new(MockPms::new()));
        let persistence = InMemoryPersistence::new();
        let factory = FactoryId::from("f1");

        persistence.incr_missed_heartbeats(&factory).await.unwrap();
        persistence.incr_consecutive_healthy(&factory).await.unwrap();

        let outcome = orchestrator
            .handle(&factory, LegacyFactoryStatus::Down, &pms, &persistence)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.previous_status, LegacyFactoryStatus::Down);
        let doc = persistence
            .get_latest_factory_status(&factory)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.legacy_status, LegacyFactoryStatus::Up);
        assert_eq!(doc.missed_heartbeats, 0);

        let events = persistence.all_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "Factory recovered from Down");
        assert!(events[0].target.is_none());
    }

    #[tokio::test]
    async fn concurrent_handle_for_same_factory_is_a_no_op() {
        let orchestrator = RecoveryOrchestrator::new(5);
        let pms = PmsClient::new(Box::new(MockPms::new()));
        let persistence = InMemoryPersistence::new();
        let factory = FactoryId::from("f1");

        let _guard = RecoveringGuard::acquire(&orchestrator.recovering, factory.clone()).unwrap();
        let outcome = orchestrator
            .handle(&factory, LegacyFactoryStatus::Down, &pms, &persistence)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }
}
