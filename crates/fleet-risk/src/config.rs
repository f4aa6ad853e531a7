//! Tunable thresholds for the risk engine and fault detector. All values
//! here are defaults, not constants — §9 of the design notes is explicit
//! that the original's hardcoded latency/resource thresholds should be
//! treated as configuration.

#[derive(Debug, Clone, Copy)]
pub struct RiskThresholds {
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

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            degraded_error_rate: 0.05,
            high_risk_error_rate: 0.10,
            missed_heartbeats_threshold: 3,
            at_risk_reading_threshold: 70.0,
            at_risk_window: 5,
            at_risk_latch_count: 3,
            latency_medium_ms: 1000.0,
            latency_high_ms: 2000.0,
            resource_medium_pct: 80.0,
            resource_high_pct: 95.0,
        }
    }
}
