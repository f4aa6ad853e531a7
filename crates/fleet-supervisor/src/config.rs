//! Supervisor tick tunables. Defaults match §6 of the design; the service
//! wiring layer overrides these from layered configuration.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// How often the tick fires. Default 1 Hz.
    pub tick_interval: Duration,
    /// Sensor-level heartbeat timeout fed to `scan_timeouts`.
    pub sensor_timeout: Duration,
    /// Factory-level window used to decide whether a heartbeat was "recent
    /// enough" when driving the missed/consecutive-healthy counters.
    pub heartbeat_timeout: Duration,
    /// Window, in seconds, used for the latency-trend and error-rate
    /// telemetry queried from persistence.
    pub metrics_window_secs: i64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            sensor_timeout: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(3),
            metrics_window_secs: 60,
        }
    }
}
