//! Layered service configuration: struct `Default`s covering every value
//! named in the external interface surface, optionally loaded from a JSON
//! file and then overridden field-by-field from individual environment
//! variables for the tunables most likely to need a per-deployment tweak.

use fleet_health::HealthThresholds;
use fleet_risk::RiskThresholds;
use fleet_supervisor::SupervisorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Topic/broker settings for the abstract event bus. The in-memory bus
/// ignores `broker_url`; a real transport integrated outside this crate
/// would read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub broker_url: String,
    pub heartbeat_topic: String,
    pub readings_topic: String,
    pub sensor_failure_topic: String,
    pub restart_topic: String,
    pub sensor_at_risk_topic: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broker_url: "memory://local".into(),
            heartbeat_topic: "factory.heartbeat".into(),
            readings_topic: "factory.readings".into(),
            sensor_failure_topic: "factory.sensor-failure".into(),
            restart_topic: "factory.restart".into(),
            sensor_at_risk_topic: "factory.sensor-at-risk".into(),
        }
    }
}

/// PMS RPC endpoint and retry/circuit tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmsConfig {
    pub endpoint: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub circuit_open_secs: u64,
}

impl Default for PmsConfig {
    fn default() -> Self {
        Self {
            endpoint: "mock://pms".into(),
            max_attempts: 3,
            base_delay_ms: 500,
            circuit_open_secs: 30,
        }
    }
}

/// Persistence backend location. The in-memory backend ignores `uri`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub uri: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            uri: "memory://local".into(),
        }
    }
}

/// Serde-friendly mirror of [`HealthThresholds`] plus the store-level
/// timeouts that aren't carried on the aggregator itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthConfig {
    pub operational_pct: f64,
    pub degraded_pct: f64,
    pub critical_pct: f64,
    pub sensor_timeout_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            operational_pct: 80.0,
            degraded_pct: 50.0,
            critical_pct: 20.0,
            sensor_timeout_secs: 5,
            heartbeat_timeout_secs: 3,
        }
    }
}

impl HealthConfig {
    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            operational: self.operational_pct,
            degraded: self.degraded_pct,
            critical: self.critical_pct,
        }
    }
}

/// Serde-friendly mirror of [`RiskThresholds`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    pub degraded_error_rate: f64,
    pub high_risk_error_rate: f64,
    pub missed_heartbeats_threshold: u32,
    pub at_risk_reading_threshold: f64,
    pub at_risk_window: usize,
    pub at_risk_latch_count: u32,
    pub latency_medium_ms: f64,
    pub latency_high_ms: f64,
    pub resource_medium_pct: f64,
    pub resource_high_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let d = RiskThresholds::default();
        Self {
            degraded_error_rate: d.degraded_error_rate,
            high_risk_error_rate: d.high_risk_error_rate,
            missed_heartbeats_threshold: d.missed_heartbeats_threshold,
            at_risk_reading_threshold: d.at_risk_reading_threshold,
            at_risk_window: d.at_risk_window,
            at_risk_latch_count: d.at_risk_latch_count,
            latency_medium_ms: d.latency_medium_ms,
            latency_high_ms: d.latency_high_ms,
            resource_medium_pct: d.resource_medium_pct,
            resource_high_pct: d.resource_high_pct,
        }
    }
}

impl RiskConfig {
    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            degraded_error_rate: self.degraded_error_rate,
            high_risk_error_rate: self.high_risk_error_rate,
            missed_heartbeats_threshold: self.missed_heartbeats_threshold,
            at_risk_reading_threshold: self.at_risk_reading_threshold,
            at_risk_window: self.at_risk_window,
            at_risk_latch_count: self.at_risk_latch_count,
            latency_medium_ms: self.latency_medium_ms,
            latency_high_ms: self.latency_high_ms,
            resource_medium_pct: self.resource_medium_pct,
            resource_high_pct: self.resource_high_pct,
        }
    }
}

/// Supervisor tick cadence, serde-friendly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SupervisorTickConfig {
    pub tick_interval_secs: u64,
    pub recovery_consecutive_healthy: u32,
    pub metrics_window_secs: i64,
}

impl Default for SupervisorTickConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            recovery_consecutive_healthy: 5,
            metrics_window_secs: 60,
        }
    }
}

/// Expected normal/warning reading band for a sensor type. Metadata only:
/// informs bus-side producers and operator documentation, never consumed
/// by this service's own status derivation (readings arrive pre-classified,
/// per the ingestion dispatch table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorBand {
    pub normal_low: f64,
    pub normal_high: f64,
    pub warning_low: f64,
    pub warning_high: f64,
}

fn default_sensor_thresholds() -> HashMap<String, SensorBand> {
    let mut table = HashMap::new();
    table.insert(
        "temperature".to_string(),
        SensorBand { normal_low: 15.0, normal_high: 30.0, warning_low: 10.0, warning_high: 35.0 },
    );
    table.insert(
        "level".to_string(),
        SensorBand { normal_low: 20.0, normal_high: 90.0, warning_low: 10.0, warning_high: 95.0 },
    );
    table.insert(
        "quality_ph".to_string(),
        SensorBand { normal_low: 6.5, normal_high: 7.5, warning_low: 6.0, warning_high: 8.0 },
    );
    table.insert(
        "quality_color".to_string(),
        SensorBand { normal_low: 0.0, normal_high: 50.0, warning_low: 0.0, warning_high: 70.0 },
    );
    table.insert(
        "quality_weight".to_string(),
        SensorBand { normal_low: 90.0, normal_high: 110.0, warning_low: 85.0, warning_high: 115.0 },
    );
    table
}

/// Top-level configuration: every default named in the external interface
/// surface, loadable from a file and overridable per-field from environment
/// variables for the tunables most likely to need a per-deployment tweak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub bus: BusConfig,
    pub pms: PmsConfig,
    pub persistence: PersistenceConfig,
    pub health: HealthConfig,
    pub risk: RiskConfig,
    pub supervisor: SupervisorTickConfig,
    #[serde(default = "default_sensor_thresholds")]
    pub sensor_thresholds: HashMap<String, SensorBand>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            pms: PmsConfig::default(),
            persistence: PersistenceConfig::default(),
            health: HealthConfig::default(),
            risk: RiskConfig::default(),
            supervisor: SupervisorTickConfig::default(),
            sensor_thresholds: default_sensor_thresholds(),
        }
    }
}

impl ServiceConfig {
    /// Loads `CONFIG_PATH` (default `/etc/fleet-monitor/config.json`) if it
    /// exists and parses, falling back to built-in defaults with a warn log.
    /// Individual environment variable overrides are then layered on top.
    pub fn load() -> Self {
        let path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "/etc/fleet-monitor/config.json".into());

        let mut config = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(config) => Some(config),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "config file present but invalid, using defaults");
                    None
                }
            })
            .unwrap_or_else(|| {
                tracing::warn!(path = %path, "config file not found, using defaults");
                Self::default()
            });

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("FLEET_SENSOR_TIMEOUT_SECS") {
            self.health.sensor_timeout_secs = v;
        }
        if let Some(v) = env_u64("FLEET_HEARTBEAT_TIMEOUT_SECS") {
            self.health.heartbeat_timeout_secs = v;
        }
        if let Some(v) = env_u32("FLEET_MISSED_HEARTBEATS_THRESHOLD") {
            self.risk.missed_heartbeats_threshold = v;
        }
        if let Some(v) = env_f64("FLEET_DEGRADED_ERROR_RATE") {
            self.risk.degraded_error_rate = v;
        }
        if let Some(v) = env_f64("FLEET_HIGH_RISK_ERROR_RATE") {
            self.risk.high_risk_error_rate = v;
        }
        if let Some(v) = env_u32("FLEET_RECOVERY_CONSECUTIVE_HEALTHY") {
            self.supervisor.recovery_consecutive_healthy = v;
        }
        if let Ok(v) = std::env::var("FLEET_PMS_ENDPOINT") {
            self.pms.endpoint = v;
        }
        if let Ok(v) = std::env::var("FLEET_PERSISTENCE_URI") {
            self.persistence.uri = v;
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            tick_interval: Duration::from_secs(self.supervisor.tick_interval_secs),
            sensor_timeout: Duration::from_secs(self.health.sensor_timeout_secs),
            heartbeat_timeout: Duration::from_secs(self.health.heartbeat_timeout_secs),
            metrics_window_secs: self.supervisor.metrics_window_secs,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_external_interface() {
        let config = ServiceConfig::default();
        assert_eq!(config.health.sensor_timeout_secs, 5);
        assert_eq!(config.health.heartbeat_timeout_secs, 3);
        assert_eq!(config.risk.missed_heartbeats_threshold, 3);
        assert_eq!(config.supervisor.recovery_consecutive_healthy, 5);
        assert_eq!(config.health.operational_pct, 80.0);
        assert!(config.sensor_thresholds.contains_key("temperature"));
    }

    #[test]
    fn health_config_converts_to_aggregator_thresholds() {
        let config = ServiceConfig::default();
        let thresholds = config.health.thresholds();
        assert_eq!(thresholds.operational, 80.0);
        assert_eq!(thresholds.degraded, 50.0);
        assert_eq!(thresholds.critical, 20.0);
    }
}
