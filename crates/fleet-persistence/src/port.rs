//! Persistence Port: the logical contract every backend (in-memory, or a
//! real database integrated outside this crate) must satisfy. No schema is
//! prescribed; callers only see these operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_common::{
    FactoryId, FactoryStatus, FailoverEvent, FleetResult, HeartbeatRecord, LegacyFactoryStatus,
    SensorId, SensorReadingRecord, SensorStatus,
};

/// Current factory status document, as last upserted.
#[derive(Debug, Clone)]
pub struct FactoryStatusDoc {
    pub factory_id: FactoryId,
    pub status: FactoryStatus,
    pub legacy_status: LegacyFactoryStatus,
    pub health_percentage: f64,
    pub ok: u32,
    pub warning: u32,
    pub failed: u32,
    pub total: u32,
    pub missed_heartbeats: u32,
    pub consecutive_healthy: u32,
    pub updated_at: DateTime<Utc>,
}

/// Logical persistence operations. Writes within one factory are observed
/// in real-time order.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn record_heartbeat(&self, record: HeartbeatRecord) -> FleetResult<()>;
    async fn record_sensor_reading(&self, record: SensorReadingRecord) -> FleetResult<()>;
    async fn upsert_sensor_status(&self, sensor_id: &SensorId, status: SensorStatus) -> FleetResult<()>;
    async fn upsert_factory_health(&self, doc: FactoryStatusDoc) -> FleetResult<()>;

    /// Atomically increments `missed_heartbeats` and returns the new value,
    /// as if read back after the write.
    async fn incr_missed_heartbeats(&self, factory_id: &FactoryId) -> FleetResult<u32>;
    /// Atomically resets `missed_heartbeats` to zero and returns it.
    async fn reset_missed_heartbeats(&self, factory_id: &FactoryId) -> FleetResult<u32>;
    /// Atomically increments `consecutive_healthy` and returns the new value.
    async fn incr_consecutive_healthy(&self, factory_id: &FactoryId) -> FleetResult<u32>;
    /// Atomically resets `consecutive_healthy` to zero and returns it.
    async fn reset_consecutive_healthy(&self, factory_id: &FactoryId) -> FleetResult<u32>;

    async fn append_event(&self, event: FailoverEvent) -> FleetResult<()>;

    async fn get_latest_heartbeat(&self, factory_id: &FactoryId) -> FleetResult<Option<HeartbeatRecord>>;
    async fn get_heartbeats_in_window(
        &self,
        factory_id: &FactoryId,
        window_seconds: i64,
    ) -> FleetResult<Vec<HeartbeatRecord>>;
    async fn get_latest_factory_status(&self, factory_id: &FactoryId) -> FleetResult<Option<FactoryStatusDoc>>;
}
