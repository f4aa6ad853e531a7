//! The 1 Hz supervisor tick: timeout scan, per-factory fault detection,
//! per-factory risk prediction, preemptive-rebalance triggers, recovery
//! scan, manual-override expiry — in that order, per §4.7. Every step is
//! bounded and the whole tick is safe to skip, so a slow tick never blocks
//! the ingestion loop it runs alongside.

use crate::config::SupervisorConfig;
use crate::view::SupervisorView;
use dashmap::DashMap;
use fleet_common::{FactoryId, FactoryStatus, LegacyFactoryStatus, RiskLevel};
use fleet_health::{FactoryHealthAggregator, SensorHealthStore};
use fleet_persistence::PersistencePort;
use fleet_resilience::{FailoverOrchestrator, PmsClient, RecoveryOrchestrator};
use fleet_risk::{
    predict_factory_risk, should_preemptively_rebalance, FactoryMetricsSnapshot, FaultDetector,
    RiskInputs, RiskThresholds,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Per-tick counters, mostly useful for tests and diagnostics logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub sensors_timed_out: usize,
    pub overrides_expired: usize,
    pub failovers_triggered: usize,
    pub rebalances_triggered: usize,
    pub recoveries_triggered: usize,
}

pub struct Supervisor {
    health_store: Arc<SensorHealthStore>,
    aggregator: Arc<FactoryHealthAggregator>,
    fault_detector: Arc<FaultDetector>,
    risk_thresholds: RiskThresholds,
    persistence: Arc<dyn PersistencePort>,
    failover: Arc<FailoverOrchestrator>,
    recovery: Arc<RecoveryOrchestrator>,
    pms: Arc<PmsClient>,
    risk_cache: Arc<DashMap<FactoryId, RiskLevel>>,
    config: SupervisorConfig,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        health_store: Arc<SensorHealthStore>,
        aggregator: Arc<FactoryHealthAggregator>,
        fault_detector: Arc<FaultDetector>,
        risk_thresholds: RiskThresholds,
        persistence: Arc<dyn PersistencePort>,
        failover: Arc<FailoverOrchestrator>,
        recovery: Arc<RecoveryOrchestrator>,
        pms: Arc<PmsClient>,
        risk_cache: Arc<DashMap<FactoryId, RiskLevel>>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            health_store,
            aggregator,
            fault_detector,
            risk_thresholds,
            persistence,
            failover,
            recovery,
            pms,
            risk_cache,
            config,
        }
    }

    /// The shared per-factory risk cache this supervisor writes to, for
    /// callers (the orchestration-consumer task) that build their own
    /// [`FleetStatusView`](fleet_resilience::FleetStatusView) reading the
    /// same risk data.
    pub fn risk_cache(&self) -> Arc<DashMap<FactoryId, RiskLevel>> {
        self.risk_cache.clone()
    }

    /// Runs the tick on `config.tick_interval` until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("supervisor received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.run_once().await;
                    tracing::debug!(?report, "supervisor tick complete");
                }
            }
        }
    }

    /// Executes one full tick and returns a summary. Exposed directly for
    /// tests and for a standalone manual-trigger admin path.
    pub async fn run_once(&self) -> TickReport {
        let mut report = TickReport::default();

        self.timeout_scan(&mut report).await;

        let factories = self.health_store.factory_ids();
        let mut consecutive_healthy_by_factory = std::collections::HashMap::new();

        for factory_id in &factories {
            let (missed, consecutive_healthy) = self.update_heartbeat_counters(factory_id).await;
            consecutive_healthy_by_factory.insert(factory_id.clone(), consecutive_healthy);

            let snapshot = self.build_metrics_snapshot(factory_id, missed).await;
            for fault in self.fault_detector.detect_faults(factory_id, &snapshot) {
                tracing::warn!(
                    factory = %factory_id,
                    fault_type = ?fault.fault_type,
                    severity = ?fault.severity,
                    "fault detected"
                );
            }

            let legacy_status = self.aggregator.cached_status(factory_id).map(|s| s.to_legacy());
            let assessment = predict_factory_risk(
                factory_id,
                &RiskInputs {
                    error_rate: snapshot_error_rate(&snapshot),
                    latencies_ms: Vec::new(),
                    missed_heartbeats: missed,
                    legacy_status,
                    cpu_usage: snapshot.cpu_usage,
                    memory_usage: snapshot.memory_usage,
                },
                &self.risk_thresholds,
            );
            self.risk_cache.insert(factory_id.clone(), assessment.risk_level);

            let view = SupervisorView {
                health_store: &self.health_store,
                aggregator: &self.aggregator,
                risk_cache: &self.risk_cache,
            };
            let any_other_up = factories.iter().any(|g| {
                g != factory_id
                    && view.legacy_status(g).map(|s| s.is_up()).unwrap_or(false)
            });
            if should_preemptively_rebalance(&assessment, any_other_up)
                && !self.failover.is_active(factory_id)
            {
                let _ = self
                    .failover
                    .preemptive_rebalance(factory_id, &view, &self.pms, self.persistence.as_ref())
                    .await;
                report.rebalances_triggered += 1;
            }
        }

        for factory_id in &factories {
            let view = SupervisorView {
                health_store: &self.health_store,
                aggregator: &self.aggregator,
                risk_cache: &self.risk_cache,
            };
            let current_status = view.legacy_status(factory_id).unwrap_or(LegacyFactoryStatus::Down);
            let consecutive_healthy = *consecutive_healthy_by_factory.get(factory_id).unwrap_or(&0);
            // Derived fresh from the current sensor counts, not the cached
            // legacy view, so a factory whose sensors are still failing
            // can't be recovered on heartbeat recency alone.
            let sensor_status = self
                .aggregator
                .derive_status(&self.health_store.get_factory_summary(factory_id));
            if self.recovery.check(current_status, consecutive_healthy, sensor_status) {
                if self
                    .recovery
                    .handle(factory_id, current_status, &self.pms, self.persistence.as_ref())
                    .await
                    .ok()
                    .flatten()
                    .is_some()
                {
                    report.recoveries_triggered += 1;
                    // Keep the aggregator's cached status aligned with the
                    // recovery `handle` just persisted, so the next tick's
                    // `legacy_status` read agrees and recovery doesn't fire
                    // again for the same factory.
                    self.aggregator.recompute(factory_id, &self.health_store);
                }
            }
        }

        report.overrides_expired = self.health_store.sweep_expired_overrides();
        report
    }

    async fn timeout_scan(&self, report: &mut TickReport) {
        let newly_failed = self.health_store.scan_timeouts(self.config.sensor_timeout);
        report.sensors_timed_out = newly_failed.len();

        let mut touched_factories: Vec<FactoryId> = Vec::new();
        for sensor_id in &newly_failed {
            if let Some(factory_id) = self.health_store.get_factory_id(sensor_id) {
                if !touched_factories.contains(&factory_id) {
                    touched_factories.push(factory_id);
                }
            }
        }

        for factory_id in touched_factories {
            if let Some(transition) = self.aggregator.recompute(&factory_id, &self.health_store) {
                tracing::info!(
                    factory = %transition.factory_id,
                    to = ?transition.to,
                    "factory status transition from timeout scan"
                );
                if transition.to == FactoryStatus::Down && !self.failover.is_active(&factory_id) {
                    let view = SupervisorView {
                        health_store: &self.health_store,
                        aggregator: &self.aggregator,
                        risk_cache: &self.risk_cache,
                    };
                    let _ = self
                        .failover
                        .trigger(
                            &factory_id,
                            &transition.reason,
                            &view,
                            &self.pms,
                            self.persistence.as_ref(),
                        )
                        .await;
                    report.failovers_triggered += 1;
                }
            }
        }
    }

    /// Reconciles the legacy missed/consecutive-healthy counters against
    /// whether a heartbeat arrived within `heartbeat_timeout`. Returns the
    /// post-update `(missed_heartbeats, consecutive_healthy)` pair.
    async fn update_heartbeat_counters(&self, factory_id: &FactoryId) -> (u32, u32) {
        let latest = self
            .persistence
            .get_latest_heartbeat(factory_id)
            .await
            .ok()
            .flatten();
        let recent = latest
            .map(|hb| chrono::Utc::now() - hb.timestamp <= chrono_duration(self.config.heartbeat_timeout))
            .unwrap_or(false);

        if recent {
            let consecutive_healthy = self
                .persistence
                .incr_consecutive_healthy(factory_id)
                .await
                .unwrap_or(0);
            let _ = self.persistence.reset_missed_heartbeats(factory_id).await;
            (0, consecutive_healthy)
        } else {
            let missed = self
                .persistence
                .incr_missed_heartbeats(factory_id)
                .await
                .unwrap_or(0);
            let _ = self.persistence.reset_consecutive_healthy(factory_id).await;
            (missed, 0)
        }
    }

    async fn build_metrics_snapshot(
        &self,
        factory_id: &FactoryId,
        missed_heartbeats: u32,
    ) -> FactoryMetricsSnapshot {
        let summary = self.health_store.get_factory_summary(factory_id);
        let total = summary.total();
        let error_rate = if total == 0 {
            0.0
        } else {
            summary.failed.len() as f64 / total as f64
        };

        let window = self
            .persistence
            .get_heartbeats_in_window(factory_id, self.config.metrics_window_secs)
            .await
            .unwrap_or_default();
        let avg_latency_ms = average_interarrival_ms(&window);

        FactoryMetricsSnapshot {
            missed_heartbeats,
            error_rate,
            avg_latency_ms,
            cpu_usage: 0.0,
            memory_usage: 0.0,
        }
    }
}

fn snapshot_error_rate(snapshot: &FactoryMetricsSnapshot) -> f64 {
    snapshot.error_rate
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

/// Average gap between consecutive heartbeat timestamps in a window,
/// newest-first as returned by the persistence query; used as a rough
/// latency proxy when no dedicated round-trip measurement exists.
fn average_interarrival_ms(records: &[fleet_common::HeartbeatRecord]) -> f64 {
    if records.len() < 2 {
        return 0.0;
    }
    let mut total_ms = 0i64;
    for pair in records.windows(2) {
        total_ms += (pair[0].timestamp - pair[1].timestamp).num_milliseconds().abs();
    }
    total_ms as f64 / (records.len() - 1) as f64
}
