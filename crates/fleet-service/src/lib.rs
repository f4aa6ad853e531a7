//! Wires the ingestion loop, the periodic supervisor, and the
//! failover/recovery orchestrators into one runnable fleet health monitor.
//! `main.rs` is a thin entry point; everything process-shaped lives here so
//! it can be exercised from tests without a real `tokio::main`.

pub mod config;

use config::ServiceConfig;
use dashmap::DashMap;
use fleet_common::{FactoryId, LegacyFactoryStatus, RiskLevel};
use fleet_health::{FactoryHealthAggregator, SensorHealthStore};
use fleet_ingestion::{EventBus, IngestionEngine, InMemoryBus};
use fleet_persistence::{InMemoryPersistence, PersistencePort};
use fleet_resilience::{FailoverOrchestrator, MockPms, PmsClient, RecoveryOrchestrator};
use fleet_risk::{FaultDetector, SensorRiskTracker};
use fleet_supervisor::{Supervisor, SupervisorView};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Top-level error surfaced by [`FleetMonitor::run`]. Startup failures (the
/// only variant that should terminate the process with a non-zero exit
/// code) are distinguished from the rest of the boundary error taxonomy.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("startup failed: {0}")]
    Startup(String),
}

/// The composed, runnable service. Every dependency is an `Arc`-shared
/// service, never a global — constructed once in [`FleetMonitor::new`] and
/// cloned into the tasks [`FleetMonitor::run`] spawns.
pub struct FleetMonitor {
    config: ServiceConfig,
    bus: Arc<dyn EventBus>,
    health_store: Arc<SensorHealthStore>,
    aggregator: Arc<FactoryHealthAggregator>,
    persistence: Arc<dyn PersistencePort>,
    failover: Arc<FailoverOrchestrator>,
    recovery: Arc<RecoveryOrchestrator>,
    pms: Arc<PmsClient>,
    risk_cache: Arc<DashMap<FactoryId, RiskLevel>>,
    ingestion: Arc<IngestionEngine>,
    transitions_rx: Mutex<Option<mpsc::UnboundedReceiver<fleet_common::StatusTransition>>>,
    supervisor: Arc<Supervisor>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FleetMonitor {
    /// Composes every service from `config`, backed by the in-memory bus,
    /// persistence and PMS port implementations. A durable backend for any
    /// of the three is an integration concern outside this crate.
    pub fn new(config: ServiceConfig) -> Self {
        let health_store = Arc::new(SensorHealthStore::new());
        let aggregator = Arc::new(FactoryHealthAggregator::new(config.health.thresholds()));
        let risk_tracker = Arc::new(SensorRiskTracker::new(config.risk.thresholds()));
        let fault_detector = Arc::new(FaultDetector::new(config.risk.thresholds()));
        let persistence: Arc<dyn PersistencePort> = Arc::new(InMemoryPersistence::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
        let failover = Arc::new(FailoverOrchestrator::new());
        let recovery = Arc::new(RecoveryOrchestrator::new(
            config.supervisor.recovery_consecutive_healthy,
        ));
        let pms = Arc::new(PmsClient::new(Box::new(MockPms::new())));
        let risk_cache: Arc<DashMap<FactoryId, RiskLevel>> = Arc::new(DashMap::new());

        let (ingestion, transitions_rx) = IngestionEngine::new(
            bus.clone(),
            health_store.clone(),
            aggregator.clone(),
            risk_tracker,
            persistence.clone(),
        );

        let supervisor_config = config.supervisor_config();
        let supervisor = Arc::new(Supervisor::new(
            health_store.clone(),
            aggregator.clone(),
            fault_detector,
            config.risk.thresholds(),
            persistence.clone(),
            failover.clone(),
            recovery.clone(),
            pms.clone(),
            risk_cache.clone(),
            supervisor_config,
        ));

        Self {
            config,
            bus,
            health_store,
            aggregator,
            persistence,
            failover,
            recovery,
            pms,
            risk_cache,
            ingestion: Arc::new(ingestion),
            transitions_rx: Mutex::new(Some(transitions_rx)),
            supervisor,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Confirms the persistence backend is reachable before the rest of the
    /// service starts. The in-memory backend never fails; this is the seam
    /// a durable backend's connection probe would occupy.
    pub async fn check_persistence(&self) -> Result<(), ServiceError> {
        self.persistence
            .get_latest_factory_status(&FactoryId::from("__startup_probe__"))
            .await
            .map(|_| ())
            .map_err(|err| ServiceError::Startup(err.to_string()))
    }

    /// Runs the ingestion loop, the supervisor tick, and the orchestration
    /// consumer until `shutdown()` is called or the process receives a
    /// shutdown signal externally. Returns once every task has observed
    /// shutdown and exited.
    pub async fn run(self: &Arc<Self>) {
        let transitions_rx = self
            .transitions_rx
            .lock()
            .await
            .take()
            .expect("FleetMonitor::run called more than once");

        let ingestion = self.ingestion.clone();
        let ingestion_shutdown = self.shutdown_tx.subscribe();
        let ingestion_task = tokio::spawn(async move { ingestion.run(ingestion_shutdown).await });

        let supervisor = self.supervisor.clone();
        let supervisor_shutdown = self.shutdown_tx.subscribe();
        let supervisor_task = tokio::spawn(async move { supervisor.run(supervisor_shutdown).await });

        let this = self.clone();
        let orchestration_shutdown = self.shutdown_tx.subscribe();
        let orchestration_task =
            tokio::spawn(async move { this.run_orchestration_consumer(transitions_rx, orchestration_shutdown).await });

        let _ = tokio::join!(ingestion_task, supervisor_task, orchestration_task);
    }

    /// Drains factory status transitions emitted by the ingestion loop and
    /// triggers failover exactly when a transition lands on DOWN. Recovery
    /// is driven entirely by the supervisor tick, not by transitions.
    async fn run_orchestration_consumer(
        self: Arc<Self>,
        mut transitions_rx: mpsc::UnboundedReceiver<fleet_common::StatusTransition>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("orchestration consumer received shutdown signal");
                    break;
                }
                transition = transitions_rx.recv() => {
                    let Some(transition) = transition else { break };
                    if transition.legacy_to != LegacyFactoryStatus::Down {
                        continue;
                    }
                    if self.failover.is_active(&transition.factory_id) {
                        continue;
                    }
                    let view = SupervisorView {
                        health_store: &self.health_store,
                        aggregator: &self.aggregator,
                        risk_cache: &self.risk_cache,
                    };
                    let _ = self
                        .failover
                        .trigger(&transition.factory_id, &transition.reason, &view, &self.pms, self.persistence.as_ref())
                        .await;
                }
            }
        }
    }

    /// Broadcasts the shutdown signal every task observes at its next
    /// suspension point.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn monitor_runs_and_shuts_down_cleanly() {
        let monitor = Arc::new(FleetMonitor::new(ServiceConfig::default()));
        assert!(monitor.check_persistence().await.is_ok());

        let shutdown_handle = monitor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_handle.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(5), monitor.run())
            .await
            .expect("monitor did not shut down within the timeout");
    }

    #[tokio::test]
    #[should_panic(expected = "FleetMonitor::run called more than once")]
    async fn run_panics_if_called_twice() {
        let monitor = Arc::new(FleetMonitor::new(ServiceConfig::default()));
        let first = monitor.clone();
        tokio::spawn(async move { first.run().await });
        tokio::task::yield_now().await;
        monitor.run().await;
    }
}
