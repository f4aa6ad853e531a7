//! Wire and persisted event types.
//!
//! Inbound bus payloads are decoded exactly once, at the ingestion boundary,
//! into [`InboundEvent`]. No untyped JSON value flows past that boundary
//! into the health store, risk engine or orchestrators.

use crate::ids::{FactoryId, SensorId};
use crate::status::{FactoryStatus, LegacyFactoryStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded inbound bus message, tagged by the topic (or embedded
/// `message_type`) it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Heartbeat(HeartbeatPayload),
    Reading(ReadingPayload),
    SensorFailure(SensorFailurePayload),
    FactoryRestart(FactoryRestartPayload),
}

/// `factory.heartbeat` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeartbeatPayload {
    #[serde(alias = "sensorId")]
    pub sensor_id: SensorId,
    #[serde(alias = "factoryId")]
    pub factory_id: FactoryId,
    #[serde(default = "default_tier")]
    pub tier: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
}

fn default_tier() -> String {
    "unknown".to_string()
}

/// `factory.readings` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReadingPayload {
    #[serde(alias = "sensorId")]
    pub sensor_id: SensorId,
    #[serde(alias = "factoryId")]
    pub factory_id: FactoryId,
    pub reading: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// `factory.sensor-failure` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SensorFailurePayload {
    #[serde(alias = "sensorId")]
    pub sensor_id: SensorId,
    #[serde(alias = "factoryId")]
    pub factory_id: Option<FactoryId>,
    #[serde(default)]
    pub reading: Option<f64>,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "Unknown".to_string()
}

/// `factory.restart` payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FactoryRestartPayload {
    #[serde(alias = "factoryId")]
    pub factory_id: FactoryId,
    #[serde(alias = "recoveredSensors", default)]
    pub recovered_sensors: Vec<SensorId>,
}

/// Outbound `factory.sensor-at-risk` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorAtRisk {
    #[serde(rename = "factoryId")]
    pub factory_id: FactoryId,
    #[serde(rename = "sensorId")]
    pub sensor_id: SensorId,
    #[serde(rename = "lowReadingCount")]
    pub low_reading_count: u32,
    #[serde(rename = "recentReadings")]
    pub recent_readings: Vec<f64>,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only heartbeat record, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub sensor_id: SensorId,
    pub factory_id: FactoryId,
    pub tier: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only sensor reading record, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReadingRecord {
    pub sensor_id: SensorId,
    pub factory_id: FactoryId,
    pub reading: f64,
    pub timestamp: DateTime<Utc>,
}

/// A failover or recovery event, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub factory_id: FactoryId,
    pub reason: String,
    pub target: Option<FactoryId>,
    pub timestamp: DateTime<Utc>,
}

/// Emitted exactly when a factory's derived status changes; the sole trigger
/// for downstream failover/recovery orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub factory_id: FactoryId,
    pub from: Option<FactoryStatus>,
    pub to: FactoryStatus,
    pub legacy_to: LegacyFactoryStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
