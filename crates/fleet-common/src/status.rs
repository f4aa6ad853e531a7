//! Status enums shared by the health store, aggregator and risk engine.

use serde::{Deserialize, Serialize};

/// Health status of a single sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorStatus {
    Ok,
    Warning,
    Failed,
}

impl Default for SensorStatus {
    fn default() -> Self {
        SensorStatus::Ok
    }
}

/// Canonical factory status, derived from the sensor-status percentage model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FactoryStatus {
    Operational,
    Degraded,
    Critical,
    Down,
}

/// Legacy heartbeat-count-driven factory status, kept for PMS and historical
/// persistence compatibility. A [`FactoryStatus`] is always translatable into
/// one, never the other way around, since the legacy model is lossy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegacyFactoryStatus {
    Up,
    Degraded,
    Down,
}

impl FactoryStatus {
    /// Map the canonical percentage-model status onto the three-value legacy
    /// status PMS and older persisted documents understand.
    pub fn to_legacy(self) -> LegacyFactoryStatus {
        match self {
            FactoryStatus::Operational => LegacyFactoryStatus::Up,
            FactoryStatus::Degraded => LegacyFactoryStatus::Degraded,
            FactoryStatus::Critical | FactoryStatus::Down => LegacyFactoryStatus::Down,
        }
    }

    /// Derive the canonical status from the current OK-sensor percentage,
    /// using the configured thresholds (default 80/50/20).
    pub fn from_health_percentage(pct: f64, operational: f64, degraded: f64, critical: f64) -> Self {
        if pct >= operational {
            FactoryStatus::Operational
        } else if pct >= degraded {
            FactoryStatus::Degraded
        } else if pct >= critical {
            FactoryStatus::Critical
        } else {
            FactoryStatus::Down
        }
    }
}

impl LegacyFactoryStatus {
    /// Derive the legacy status from a missed-heartbeat count and threshold.
    pub fn from_missed_heartbeats(missed: u32, threshold: u32) -> Self {
        if missed == 0 {
            LegacyFactoryStatus::Up
        } else if missed < threshold {
            LegacyFactoryStatus::Degraded
        } else {
            LegacyFactoryStatus::Down
        }
    }

    /// Whether this status counts as "up" for backup-selection purposes.
    pub fn is_up(self) -> bool {
        matches!(self, LegacyFactoryStatus::Up)
    }
}

/// Risk classification produced by the risk engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify a weighted risk score in `[0, 1]`.
    pub fn classify(score: f64) -> Self {
        if score >= 0.7 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Ascending rank used to order failover backup candidates
    /// (`LOW=0, MEDIUM=1, HIGH=2`).
    pub fn rank(self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_boundaries() {
        assert_eq!(
            FactoryStatus::from_health_percentage(80.0, 80.0, 50.0, 20.0),
            FactoryStatus::Operational
        );
        assert_eq!(
            FactoryStatus::from_health_percentage(79.999, 80.0, 50.0, 20.0),
            FactoryStatus::Degraded
        );
        assert_eq!(
            FactoryStatus::from_health_percentage(45.0, 80.0, 50.0, 20.0),
            FactoryStatus::Critical
        );
        assert_eq!(
            FactoryStatus::from_health_percentage(10.0, 80.0, 50.0, 20.0),
            FactoryStatus::Down
        );
    }

    #[test]
    fn legacy_translation_is_lossy_toward_down() {
        assert_eq!(FactoryStatus::Operational.to_legacy(), LegacyFactoryStatus::Up);
        assert_eq!(FactoryStatus::Degraded.to_legacy(), LegacyFactoryStatus::Degraded);
        assert_eq!(FactoryStatus::Critical.to_legacy(), LegacyFactoryStatus::Down);
        assert_eq!(FactoryStatus::Down.to_legacy(), LegacyFactoryStatus::Down);
    }

    #[test]
    fn risk_score_boundaries() {
        assert_eq!(RiskLevel::classify(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.3999), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.6999), RiskLevel::Medium);
    }
}
