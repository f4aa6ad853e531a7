//! Per-factory fault detection: classifies fault severity independent of
//! the headline risk score, feeding diagnostics and the supervisor tick.

use crate::config::RiskThresholds;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fleet_common::FactoryId;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    HeartbeatTimeout,
    HighErrorRate,
    HighLatency,
    ResourceExhaustion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct FaultDetection {
    pub factory_id: FactoryId,
    pub fault_type: FaultType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the metrics a fault-detection pass needs for one factory.
#[derive(Debug, Clone, Default)]
pub struct FactoryMetricsSnapshot {
    pub missed_heartbeats: u32,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

const FAULT_HISTORY_CAP: usize = 100;

/// Runs the four detection checks and retains a bounded per-factory history.
pub struct FaultDetector {
    thresholds: RiskThresholds,
    history: DashMap<FactoryId, VecDeque<FaultDetection>>,
}

impl FaultDetector {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self {
            thresholds,
            history: DashMap::new(),
        }
    }

    /// Runs all detection checks for a factory and records any faults found.
    pub fn detect_faults(
        &self,
        factory_id: &FactoryId,
        snapshot: &FactoryMetricsSnapshot,
    ) -> Vec<FaultDetection> {
        let now = Utc::now();
        let mut faults = Vec::new();

        if let Some(severity) = self.check_missed_heartbeats(snapshot.missed_heartbeats) {
            faults.push(FaultDetection {
                factory_id: factory_id.clone(),
                fault_type: FaultType::HeartbeatTimeout,
                severity,
                timestamp: now,
            });
        }
        if let Some(severity) = self.check_error_rate(snapshot.error_rate) {
            faults.push(FaultDetection {
                factory_id: factory_id.clone(),
                fault_type: FaultType::HighErrorRate,
                severity,
                timestamp: now,
            });
        }
        if let Some(severity) = self.check_latency(snapshot.avg_latency_ms) {
            faults.push(FaultDetection {
                factory_id: factory_id.clone(),
                fault_type: FaultType::HighLatency,
                severity,
                timestamp: now,
            });
        }
        if let Some(severity) = self.check_resource_usage(snapshot.cpu_usage, snapshot.memory_usage) {
            faults.push(FaultDetection {
                factory_id: factory_id.clone(),
                fault_type: FaultType::ResourceExhaustion,
                severity,
                timestamp: now,
            });
        }

        if !faults.is_empty() {
            let mut entry = self.history.entry(factory_id.clone()).or_default();
            for fault in &faults {
                entry.push_back(fault.clone());
            }
            while entry.len() > FAULT_HISTORY_CAP {
                entry.pop_front();
            }
        }

        faults
    }

    fn check_missed_heartbeats(&self, missed: u32) -> Option<Severity> {
        if missed >= self.thresholds.missed_heartbeats_threshold {
            Some(Severity::High)
        } else if missed > 0 {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    fn check_error_rate(&self, error_rate: f64) -> Option<Severity> {
        if error_rate >= self.thresholds.high_risk_error_rate {
            Some(Severity::High)
        } else if error_rate >= self.thresholds.degraded_error_rate {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    fn check_latency(&self, avg_latency_ms: f64) -> Option<Severity> {
        if avg_latency_ms > self.thresholds.latency_high_ms {
            Some(Severity::High)
        } else if avg_latency_ms > self.thresholds.latency_medium_ms {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    fn check_resource_usage(&self, cpu_usage: f64, memory_usage: f64) -> Option<Severity> {
        let max_usage = cpu_usage.max(memory_usage);
        if max_usage > self.thresholds.resource_high_pct {
            Some(Severity::High)
        } else if max_usage > self.thresholds.resource_medium_pct {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    pub fn get_fault_history(&self, factory_id: &FactoryId, limit: usize) -> Vec<FaultDetection> {
        self.history
            .get(factory_id)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_exhaustion_severity_buckets() {
        let detector = FaultDetector::new(RiskThresholds::default());
        let factory = FactoryId::from("f1");

        let mut snapshot = FactoryMetricsSnapshot::default();
        snapshot.cpu_usage = 96.0;
        let faults = detector.detect_faults(&factory, &snapshot);
        assert!(faults
            .iter()
            .any(|f| f.fault_type == FaultType::ResourceExhaustion && f.severity == Severity::High));

        let mut snapshot = FactoryMetricsSnapshot::default();
        snapshot.memory_usage = 85.0;
        let faults = detector.detect_faults(&factory, &snapshot);
        assert!(faults
            .iter()
            .any(|f| f.fault_type == FaultType::ResourceExhaustion && f.severity == Severity::Medium));
    }

    #[test]
    fn history_is_capped() {
        let detector = FaultDetector::new(RiskThresholds::default());
        let factory = FactoryId::from("f1");
        let mut snapshot = FactoryMetricsSnapshot::default();
        snapshot.cpu_usage = 99.0;
        for _ in 0..(FAULT_HISTORY_CAP + 10) {
            detector.detect_faults(&factory, &snapshot);
        }
        assert_eq!(detector.get_fault_history(&factory, 1000).len(), FAULT_HISTORY_CAP);
    }
}
