//! The ingestion loop: consumes the bus, decodes each message exactly once,
//! dispatches into the health store and risk tracker, and emits factory
//! status transitions for whatever orchestration layer is listening.
//!
//! The loop itself never performs a blocking persistence or PMS call.
//! Heartbeats are staged on [`HeartbeatQueue`] and drained by a dedicated
//! flush task; reading/failure/restart writes are posted to the runtime via
//! `tokio::spawn` so a slow persistence backend cannot stall message
//! dispatch.

use crate::bus::{EventBus, PollOutcome};
use crate::decode::{decode_message, DecodeOutcome};
use crate::mailbox::HeartbeatQueue;
use fleet_common::{
    AtomicCounter, FactoryId, HeartbeatRecord, InboundEvent, SensorReadingRecord, SensorStatus,
    StatusTransition,
};
use fleet_health::{FactoryHealthAggregator, SensorHealthStore};
use fleet_persistence::PersistencePort;
use fleet_risk::SensorRiskTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const BUS_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const BUS_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const HEARTBEAT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const HEARTBEAT_FLUSH_BATCH: usize = 256;
const SENSOR_AT_RISK_TOPIC: &str = "factory.sensor-at-risk";

/// Error/drop counters surfaced for health/readiness and diagnostics.
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    pub malformed_payloads: AtomicCounter,
    pub unknown_topics: AtomicCounter,
    pub heartbeats_dropped: AtomicCounter,
    pub bus_reconnects: AtomicCounter,
}

/// Consumes one bus, updates live fleet state, and republishes derived
/// notifications. Construct with [`IngestionEngine::new`], which also hands
/// back the receiving half of the factory status transition channel.
pub struct IngestionEngine {
    bus: Arc<dyn EventBus>,
    health_store: Arc<SensorHealthStore>,
    aggregator: Arc<FactoryHealthAggregator>,
    risk_tracker: Arc<SensorRiskTracker>,
    persistence: Arc<dyn PersistencePort>,
    transitions_tx: mpsc::UnboundedSender<StatusTransition>,
    heartbeat_queue: Arc<HeartbeatQueue>,
    metrics: Arc<IngestionMetrics>,
}

impl IngestionEngine {
    pub fn new(
        bus: Arc<dyn EventBus>,
        health_store: Arc<SensorHealthStore>,
        aggregator: Arc<FactoryHealthAggregator>,
        risk_tracker: Arc<SensorRiskTracker>,
        persistence: Arc<dyn PersistencePort>,
    ) -> (Self, mpsc::UnboundedReceiver<StatusTransition>) {
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let engine = Self {
            bus,
            health_store,
            aggregator,
            risk_tracker,
            persistence,
            transitions_tx,
            heartbeat_queue: Arc::new(HeartbeatQueue::default()),
            metrics: Arc::new(IngestionMetrics::default()),
        };
        (engine, transitions_rx)
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Runs until `shutdown` fires. Spawns the heartbeat flush task
    /// alongside the poll loop; both observe the same shutdown signal.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let flush_shutdown = shutdown.resubscribe();
        let flusher = tokio::spawn(Self::flush_heartbeats(
            self.heartbeat_queue.clone(),
            self.persistence.clone(),
            flush_shutdown,
        ));

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("ingestion loop received shutdown signal");
                    break;
                }
                outcome = self.bus.poll(BUS_POLL_TIMEOUT) => {
                    match outcome {
                        Ok(PollOutcome::Message(msg)) => self.handle_message(msg).await,
                        Ok(PollOutcome::Idle) => {}
                        Ok(PollOutcome::PartitionEof) => {}
                        Err(err) => {
                            self.metrics.bus_reconnects.inc();
                            tracing::warn!(error = %err, "bus transport error, reconnecting");
                            tokio::time::sleep(BUS_RECONNECT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        let _ = flusher.await;
    }

    async fn flush_heartbeats(
        queue: Arc<HeartbeatQueue>,
        persistence: Arc<dyn PersistencePort>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(HEARTBEAT_FLUSH_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    Self::flush_batch(&queue, &persistence).await;
                    break;
                }
                _ = interval.tick() => {
                    Self::flush_batch(&queue, &persistence).await;
                }
            }
        }
    }

    async fn flush_batch(queue: &HeartbeatQueue, persistence: &Arc<dyn PersistencePort>) {
        for record in queue.drain(HEARTBEAT_FLUSH_BATCH) {
            if let Err(err) = persistence.record_heartbeat(record).await {
                tracing::warn!(error = %err, "dropping heartbeat record after persistence error");
            }
        }
    }

    async fn handle_message(&self, msg: crate::bus::BusMessage) {
        match decode_message(&msg) {
            DecodeOutcome::Event(event) => self.dispatch(event).await,
            DecodeOutcome::UnknownTopic(topic) => {
                self.metrics.unknown_topics.inc();
                tracing::warn!(topic, "dropping message on unknown topic");
            }
            DecodeOutcome::Malformed { topic, error } => {
                self.metrics.malformed_payloads.inc();
                tracing::warn!(topic, error, "dropping malformed payload");
            }
        }
    }

    async fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::Heartbeat(p) => {
                self.health_store.on_heartbeat(
                    &p.sensor_id,
                    &p.factory_id,
                    p.tier.clone(),
                    p.timestamp,
                );
                if self.heartbeat_queue.push(HeartbeatRecord {
                    sensor_id: p.sensor_id,
                    factory_id: p.factory_id.clone(),
                    tier: p.tier,
                    timestamp: p.timestamp,
                }) {
                    self.metrics.heartbeats_dropped.inc();
                    tracing::debug!(factory = %p.factory_id, "heartbeat queue full, dropped oldest");
                }
                // Heartbeats alone never change sensor status, so there is
                // nothing to recompute the factory aggregate over.
            }
            InboundEvent::Reading(p) => {
                let status = p
                    .status
                    .as_deref()
                    .and_then(parse_reading_status)
                    .unwrap_or(SensorStatus::Ok);
                self.health_store
                    .on_reading(&p.sensor_id, &p.factory_id, status, p.timestamp);
                self.recompute_and_emit(&p.factory_id);

                if let Some(notice) =
                    self.risk_tracker
                        .track_reading(&p.sensor_id, &p.factory_id, p.reading)
                {
                    if let Ok(payload) = serde_json::to_string(&notice) {
                        if let Err(err) = self.bus.publish(SENSOR_AT_RISK_TOPIC, payload).await {
                            tracing::warn!(error = %err, "failed to publish sensor-at-risk notification");
                        }
                    }
                }

                let persistence = self.persistence.clone();
                let record = SensorReadingRecord {
                    sensor_id: p.sensor_id,
                    factory_id: p.factory_id,
                    reading: p.reading,
                    timestamp: p.timestamp,
                };
                tokio::spawn(async move {
                    if let Err(err) = persistence.record_sensor_reading(record).await {
                        tracing::warn!(error = %err, "failed to persist sensor reading");
                    }
                });
            }
            InboundEvent::SensorFailure(p) => {
                self.health_store.mark_failed(&p.sensor_id, p.reason.clone());
                let factory_id = p
                    .factory_id
                    .clone()
                    .or_else(|| self.health_store.get_factory_id(&p.sensor_id));
                if let Some(factory_id) = factory_id {
                    self.recompute_and_emit(&factory_id);
                }
                let persistence = self.persistence.clone();
                let sensor_id = p.sensor_id.clone();
                tokio::spawn(async move {
                    if let Err(err) = persistence
                        .upsert_sensor_status(&sensor_id, SensorStatus::Failed)
                        .await
                    {
                        tracing::warn!(error = %err, "failed to persist sensor-failure status");
                    }
                });
            }
            InboundEvent::FactoryRestart(p) => {
                self.health_store.recover_all(&p.factory_id, &p.recovered_sensors);
                for sensor_id in &p.recovered_sensors {
                    self.risk_tracker.reset(sensor_id);
                }
                self.recompute_and_emit(&p.factory_id);
            }
        }
    }

    fn recompute_and_emit(&self, factory_id: &FactoryId) {
        if let Some(transition) = self.aggregator.recompute(factory_id, &self.health_store) {
            tracing::info!(
                factory = %transition.factory_id,
                from = ?transition.from,
                to = ?transition.to,
                "factory status transition"
            );
            let _ = self.transitions_tx.send(transition);
        }
    }
}

fn parse_reading_status(raw: &str) -> Option<SensorStatus> {
    match raw.to_ascii_uppercase().as_str() {
        "OK" => Some(SensorStatus::Ok),
        "WARNING" => Some(SensorStatus::Warning),
        "FAILED" => Some(SensorStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use fleet_health::HealthThresholds;
    use fleet_persistence::InMemoryPersistence;
    use fleet_risk::RiskThresholds;

    fn wire() -> (
        Arc<IngestionEngine>,
        Arc<InMemoryBus>,
        Arc<SensorHealthStore>,
        mpsc::UnboundedReceiver<StatusTransition>,
    ) {
        let bus = Arc::new(InMemoryBus::new());
        let health_store = Arc::new(SensorHealthStore::new());
        let aggregator = Arc::new(FactoryHealthAggregator::new(HealthThresholds::default()));
        let risk_tracker = Arc::new(SensorRiskTracker::new(RiskThresholds::default()));
        let persistence = Arc::new(InMemoryPersistence::new());
        let (engine, rx) = IngestionEngine::new(
            bus.clone(),
            health_store.clone(),
            aggregator,
            risk_tracker,
            persistence,
        );
        (Arc::new(engine), bus, health_store, rx)
    }

    #[tokio::test]
    async fn heartbeat_updates_last_seen_without_emitting_transition() {
        let (engine, _bus, health_store, mut rx) = wire();
        health_store.register("s1".into(), "f1".into(), "temp".into());
        engine
            .dispatch(InboundEvent::Heartbeat(fleet_common::HeartbeatPayload {
                sensor_id: "s1".into(),
                factory_id: "f1".into(),
                tier: "temp".into(),
                timestamp: chrono::Utc::now(),
                status: None,
            }))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sensor_failure_emits_a_down_transition_for_single_sensor_factory() {
        let (engine, _bus, health_store, mut rx) = wire();
        health_store.register("s1".into(), "f1".into(), "temp".into());
        engine
            .dispatch(InboundEvent::SensorFailure(fleet_common::SensorFailurePayload {
                sensor_id: "s1".into(),
                factory_id: Some("f1".into()),
                reading: None,
                reason: "overheated".into(),
            }))
            .await;
        let transition = rx.try_recv().expect("expected a transition");
        assert_eq!(transition.to, fleet_common::FactoryStatus::Down);
    }

    #[tokio::test]
    async fn reading_below_threshold_three_times_publishes_at_risk() {
        let (engine, bus, health_store, _rx) = wire();
        health_store.register("s1".into(), "f1".into(), "temp".into());
        for reading in [80.0, 82.0, 65.0, 60.0, 55.0] {
            engine
                .dispatch(InboundEvent::Reading(fleet_common::ReadingPayload {
                    sensor_id: "s1".into(),
                    factory_id: "f1".into(),
                    reading,
                    status: None,
                    sensor_type: None,
                    metric: None,
                    unit: None,
                    zone: None,
                    timestamp: chrono::Utc::now(),
                }))
                .await;
        }
        let published = bus.published_messages().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, SENSOR_AT_RISK_TOPIC);
    }

    #[tokio::test]
    async fn restart_recovers_sensors_and_clears_risk_latch() {
        let (engine, _bus, health_store, mut rx) = wire();
        health_store.register("s1".into(), "f1".into(), "temp".into());
        health_store.mark_failed(&"s1".into(), "x");
        engine
            .dispatch(InboundEvent::FactoryRestart(fleet_common::FactoryRestartPayload {
                factory_id: "f1".into(),
                recovered_sensors: vec!["s1".into()],
            }))
            .await;
        assert_eq!(
            health_store.get_status(&"s1".into()),
            Some(SensorStatus::Ok)
        );
        let transition = rx.try_recv().expect("expected a transition back to operational");
        assert_eq!(transition.to, fleet_common::FactoryStatus::Operational);
    }
}
