//! Factory Health Aggregator.
//!
//! A pure function of the current sensor-status distribution for a factory,
//! with a cache of the last-emitted status so repeated recomputation is
//! idempotent and a [`fleet_common::StatusTransition`] is emitted exactly
//! when the derived status actually changes.

use crate::store::{FactorySummary, SensorHealthStore};
use chrono::Utc;
use dashmap::DashMap;
use fleet_common::{FactoryId, FactoryStatus, StatusTransition};

/// Thresholds (percent of OK sensors) for the canonical status model.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub operational: f64,
    pub degraded: f64,
    pub critical: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            operational: 80.0,
            degraded: 50.0,
            critical: 20.0,
        }
    }
}

/// Derives and caches factory status from sensor status counts.
pub struct FactoryHealthAggregator {
    thresholds: HealthThresholds,
    previous: DashMap<FactoryId, FactoryStatus>,
}

impl FactoryHealthAggregator {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            previous: DashMap::new(),
        }
    }

    /// `ok / total * 100`; `0.0` for a factory with no known sensors.
    pub fn health_percentage(summary: &FactorySummary) -> f64 {
        let total = summary.total();
        if total == 0 {
            return 0.0;
        }
        (summary.ok.len() as f64 / total as f64) * 100.0
    }

    pub fn derive_status(&self, summary: &FactorySummary) -> FactoryStatus {
        let pct = Self::health_percentage(summary);
        FactoryStatus::from_health_percentage(
            pct,
            self.thresholds.operational,
            self.thresholds.degraded,
            self.thresholds.critical,
        )
    }

    /// Recomputes status for `factory_id` from `store`'s current sensor
    /// counts. Returns `Some(transition)` exactly when the derived status
    /// differs from the previously cached one.
    pub fn recompute(
        &self,
        factory_id: &FactoryId,
        store: &SensorHealthStore,
    ) -> Option<StatusTransition> {
        let summary = store.get_factory_summary(factory_id);
        let status = self.derive_status(&summary);
        let previous = self.previous.get(factory_id).map(|v| *v);

        if previous == Some(status) {
            return None;
        }
        self.previous.insert(factory_id.clone(), status);

        Some(StatusTransition {
            factory_id: factory_id.clone(),
            from: previous,
            to: status,
            legacy_to: status.to_legacy(),
            reason: format!(
                "health {:.0}% ({} ok / {} total)",
                Self::health_percentage(&summary),
                summary.ok.len(),
                summary.total()
            ),
            timestamp: Utc::now(),
        })
    }

    pub fn cached_status(&self, factory_id: &FactoryId) -> Option<FactoryStatus> {
        self.previous.get(factory_id).map(|v| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::SensorId;

    #[test]
    fn gradual_degradation_scenario() {
        let store = SensorHealthStore::new();
        let factory = FactoryId::from("f1");
        let aggregator = FactoryHealthAggregator::new(HealthThresholds::default());

        for i in 0..20 {
            store.register(SensorId::from(format!("s{i}")), factory.clone(), "temp".into());
        }
        let t0 = aggregator.recompute(&factory, &store).unwrap();
        assert_eq!(t0.to, FactoryStatus::Operational);

        for i in 0..5 {
            store.mark_failed(&SensorId::from(format!("s{i}")), "x");
        }
        let t1 = aggregator.recompute(&factory, &store).unwrap();
        assert_eq!(t1.to, FactoryStatus::Degraded); // 75%

        for i in 5..10 {
            store.mark_failed(&SensorId::from(format!("s{i}")), "x");
        }
        // Still degraded at 50%; recompute must be a no-op (idempotent under
        // no status change) even though the underlying counts moved.
        assert!(aggregator.recompute(&factory, &store).is_none());

        store.mark_failed(&SensorId::from("s10"), "x");
        let t2 = aggregator.recompute(&factory, &store).unwrap();
        assert_eq!(t2.to, FactoryStatus::Critical); // 45%
    }

    #[test]
    fn recompute_is_idempotent_without_change() {
        let store = SensorHealthStore::new();
        let factory = FactoryId::from("f1");
        let aggregator = FactoryHealthAggregator::new(HealthThresholds::default());
        store.register(SensorId::from("s0"), factory.clone(), "temp".into());

        assert!(aggregator.recompute(&factory, &store).is_some());
        assert!(aggregator.recompute(&factory, &store).is_none());
    }
}
