//! In-memory implementation of [`PersistencePort`].
//!
//! Sufficient for the full test suite and for running the service
//! standalone. Heartbeat history per factory is capped; failover/recovery
//! events are never evicted.

use crate::port::{FactoryStatusDoc, PersistencePort};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use fleet_common::{
    FactoryId, FailoverEvent, FleetResult, HeartbeatRecord, SensorId, SensorReadingRecord,
    SensorStatus,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

const MAX_HEARTBEATS_PER_FACTORY: usize = 2048;

#[derive(Default)]
struct FactoryCounters {
    missed_heartbeats: AtomicU32,
    consecutive_healthy: AtomicU32,
}

/// In-memory persistence backend. Cheap to construct; one per process.
pub struct InMemoryPersistence {
    heartbeats: DashMap<FactoryId, RwLock<Vec<HeartbeatRecord>>>,
    readings: DashMap<SensorId, RwLock<Vec<SensorReadingRecord>>>,
    sensor_status: DashMap<SensorId, SensorStatus>,
    factory_status: DashMap<FactoryId, FactoryStatusDoc>,
    counters: DashMap<FactoryId, FactoryCounters>,
    events: RwLock<Vec<FailoverEvent>>,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            heartbeats: DashMap::new(),
            readings: DashMap::new(),
            sensor_status: DashMap::new(),
            factory_status: DashMap::new(),
            counters: DashMap::new(),
            events: RwLock::new(Vec::new()),
        }
    }

    pub fn all_events(&self) -> Vec<FailoverEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistence {
    async fn record_heartbeat(&self, record: HeartbeatRecord) -> FleetResult<()> {
        let mut bucket = self
            .heartbeats
            .entry(record.factory_id.clone())
            .or_insert_with(|| RwLock::new(Vec::new()));
        let mut bucket = bucket.write();
        bucket.push(record);
        if bucket.len() > MAX_HEARTBEATS_PER_FACTORY {
            let drop_count = bucket.len() - MAX_HEARTBEATS_PER_FACTORY;
            bucket.drain(0..drop_count);
        }
        Ok(())
    }

    async fn record_sensor_reading(&self, record: SensorReadingRecord) -> FleetResult<()> {
        self.readings
            .entry(record.sensor_id.clone())
            .or_insert_with(|| RwLock::new(Vec::new()))
            .write()
            .push(record);
        Ok(())
    }

    async fn upsert_sensor_status(&self, sensor_id: &SensorId, status: SensorStatus) -> FleetResult<()> {
        self.sensor_status.insert(sensor_id.clone(), status);
        Ok(())
    }

    async fn upsert_factory_health(&self, doc: FactoryStatusDoc) -> FleetResult<()> {
        self.factory_status.insert(doc.factory_id.clone(), doc);
        Ok(())
    }

    async fn incr_missed_heartbeats(&self, factory_id: &FactoryId) -> FleetResult<u32> {
        let counters = self.counters.entry(factory_id.clone()).or_default();
        Ok(counters.missed_heartbeats.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn reset_missed_heartbeats(&self, factory_id: &FactoryId) -> FleetResult<u32> {
        let counters = self.counters.entry(factory_id.clone()).or_default();
        counters.missed_heartbeats.store(0, Ordering::SeqCst);
        Ok(0)
    }

    async fn incr_consecutive_healthy(&self, factory_id: &FactoryId) -> FleetResult<u32> {
        let counters = self.counters.entry(factory_id.clone()).or_default();
        Ok(counters.consecutive_healthy.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn reset_consecutive_healthy(&self, factory_id: &FactoryId) -> FleetResult<u32> {
        let counters = self.counters.entry(factory_id.clone()).or_default();
        counters.consecutive_healthy.store(0, Ordering::SeqCst);
        Ok(0)
    }

    async fn append_event(&self, event: FailoverEvent) -> FleetResult<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn get_latest_heartbeat(&self, factory_id: &FactoryId) -> FleetResult<Option<HeartbeatRecord>> {
        Ok(self
            .heartbeats
            .get(factory_id)
            .and_then(|b| b.read().last().cloned()))
    }

    async fn get_heartbeats_in_window(
        &self,
        factory_id: &FactoryId,
        window_seconds: i64,
    ) -> FleetResult<Vec<HeartbeatRecord>> {
        let Some(bucket) = self.heartbeats.get(factory_id) else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let cutoff = chrono::Duration::seconds(window_seconds);
        Ok(bucket
            .read()
            .iter()
            .rev()
            .take_while(|r| now - r.timestamp <= cutoff)
            .cloned()
            .collect())
    }

    async fn get_latest_factory_status(&self, factory_id: &FactoryId) -> FleetResult<Option<FactoryStatusDoc>> {
        Ok(self.factory_status.get(factory_id).map(|v| v.clone()))
    }
}
