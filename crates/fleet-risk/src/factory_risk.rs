//! Weighted multi-factor factory risk scorer.

use crate::config::RiskThresholds;
use fleet_common::{FactoryId, LegacyFactoryStatus, RiskLevel};

/// Raw inputs the risk engine needs for one factory. Each field defaults to
/// its zero-risk mapping when data is unavailable, so the weighted sum
/// always covers all four weights.
#[derive(Debug, Clone, Default)]
pub struct RiskInputs {
    /// Error rate over the trailing window, in `[0, 1]`.
    pub error_rate: f64,
    /// Heartbeat latencies (ms) over the trailing window, most recent first
    /// (matching the order a windowed persistence query returns).
    pub latencies_ms: Vec<f64>,
    /// Consecutive missed heartbeats for this factory.
    pub missed_heartbeats: u32,
    /// Current legacy status, used when no missed-heartbeat history exists.
    pub legacy_status: Option<LegacyFactoryStatus>,
    /// Latest CPU usage percentage.
    pub cpu_usage: f64,
    /// Latest memory usage percentage.
    pub memory_usage: f64,
}

/// The four independently-scored sub-factors, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskFactors {
    pub error_rate: f64,
    pub latency_trend: f64,
    pub heartbeat_stability: f64,
    pub resource_usage: f64,
}

const WEIGHT_ERROR_RATE: f64 = 0.30;
const WEIGHT_LATENCY_TREND: f64 = 0.20;
const WEIGHT_HEARTBEAT_STABILITY: f64 = 0.30;
const WEIGHT_RESOURCE_USAGE: f64 = 0.20;

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub factory_id: FactoryId,
    pub risk_level: RiskLevel,
    pub score: f64,
    pub factors: RiskFactors,
}

fn assess_error_rate(error_rate: f64, thresholds: &RiskThresholds) -> f64 {
    if error_rate >= thresholds.high_risk_error_rate {
        1.0
    } else if error_rate >= thresholds.degraded_error_rate {
        0.6
    } else if error_rate > 0.0 {
        0.3
    } else {
        0.0
    }
}

fn assess_latency_trend(latencies_ms: &[f64], thresholds: &RiskThresholds) -> f64 {
    if latencies_ms.len() < 3 {
        return 0.0;
    }
    let mid = latencies_ms.len() / 2;
    // Input is newest-first: the front half is the more recent samples.
    let older_avg = avg(&latencies_ms[mid..]);
    let newer_avg = avg(&latencies_ms[..mid]);

    if older_avg > 0.0 {
        let increase_ratio = (newer_avg - older_avg) / older_avg;
        if increase_ratio > 0.5 {
            return 0.8;
        } else if increase_ratio > 0.2 {
            return 0.5;
        } else if increase_ratio > 0.0 {
            return 0.2;
        }
    }

    let avg_latency = avg(latencies_ms);
    if avg_latency > thresholds.latency_high_ms {
        0.9
    } else if avg_latency > thresholds.latency_medium_ms {
        0.6
    } else if avg_latency > 500.0 {
        0.3
    } else {
        0.0
    }
}

fn avg(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn assess_heartbeat_stability(
    missed_heartbeats: u32,
    legacy_status: Option<LegacyFactoryStatus>,
    thresholds: &RiskThresholds,
) -> f64 {
    if missed_heartbeats >= thresholds.missed_heartbeats_threshold {
        return 1.0;
    } else if missed_heartbeats >= 2 {
        return 0.7;
    } else if missed_heartbeats >= 1 {
        return 0.4;
    }

    match legacy_status {
        Some(LegacyFactoryStatus::Down) => 1.0,
        Some(LegacyFactoryStatus::Degraded) => 0.6,
        _ => 0.0,
    }
}

fn assess_resource_usage(cpu_usage: f64, memory_usage: f64, thresholds: &RiskThresholds) -> f64 {
    let max_usage = cpu_usage.max(memory_usage);
    if max_usage >= thresholds.resource_high_pct {
        1.0
    } else if max_usage >= 85.0 {
        0.7
    } else if max_usage >= 70.0 {
        0.4
    } else if max_usage >= 50.0 {
        0.2
    } else {
        0.0
    }
}

/// Computes the weighted risk score and classification for a factory.
pub fn predict_factory_risk(
    factory_id: &FactoryId,
    inputs: &RiskInputs,
    thresholds: &RiskThresholds,
) -> RiskAssessment {
    let factors = RiskFactors {
        error_rate: assess_error_rate(inputs.error_rate, thresholds),
        latency_trend: assess_latency_trend(&inputs.latencies_ms, thresholds),
        heartbeat_stability: assess_heartbeat_stability(
            inputs.missed_heartbeats,
            inputs.legacy_status,
            thresholds,
        ),
        resource_usage: assess_resource_usage(inputs.cpu_usage, inputs.memory_usage, thresholds),
    };

    let score = factors.error_rate * WEIGHT_ERROR_RATE
        + factors.latency_trend * WEIGHT_LATENCY_TREND
        + factors.heartbeat_stability * WEIGHT_HEARTBEAT_STABILITY
        + factors.resource_usage * WEIGHT_RESOURCE_USAGE;

    RiskAssessment {
        factory_id: factory_id.clone(),
        risk_level: RiskLevel::classify(score),
        score,
        factors,
    }
}

/// `should_preemptively_rebalance(f) ⇔ risk(f)=HIGH ∧ ∃ g≠f: status(g)=UP`.
pub fn should_preemptively_rebalance(
    assessment: &RiskAssessment,
    any_other_factory_up: bool,
) -> bool {
    assessment.risk_level == RiskLevel::High && any_other_factory_up
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_inputs_yield_low_risk() {
        let thresholds = RiskThresholds::default();
        let inputs = RiskInputs::default();
        let assessment = predict_factory_risk(&FactoryId::from("f1"), &inputs, &thresholds);
        assert_eq!(assessment.score, 0.0);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn missed_heartbeats_drive_down_status_to_high() {
        let thresholds = RiskThresholds::default();
        let mut inputs = RiskInputs::default();
        inputs.missed_heartbeats = 3;
        inputs.error_rate = 0.10;
        inputs.cpu_usage = 96.0;
        let assessment = predict_factory_risk(&FactoryId::from("f1"), &inputs, &thresholds);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(assessment.score, 1.0);
    }

    #[test]
    fn preemptive_rebalance_requires_another_up_factory() {
        let thresholds = RiskThresholds::default();
        let mut inputs = RiskInputs::default();
        inputs.missed_heartbeats = 5;
        inputs.error_rate = 0.2;
        inputs.cpu_usage = 99.0;
        let assessment = predict_factory_risk(&FactoryId::from("f1"), &inputs, &thresholds);
        assert!(should_preemptively_rebalance(&assessment, true));
        assert!(!should_preemptively_rebalance(&assessment, false));
    }
}
