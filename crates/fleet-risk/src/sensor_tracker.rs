//! Per-sensor at-risk detector: a rolling window over the last 5 readings,
//! latching `is_at_risk` once 3 consecutive readings fall below threshold.

use crate::config::RiskThresholds;
use dashmap::DashMap;
use fleet_common::{FactoryId, SensorAtRisk, SensorId};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct SensorRiskState {
    factory_id: FactoryId,
    recent_readings: VecDeque<f64>,
    low_reading_count: u32,
    is_at_risk: bool,
}

impl SensorRiskState {
    fn new(factory_id: FactoryId) -> Self {
        Self {
            factory_id,
            recent_readings: VecDeque::new(),
            low_reading_count: 0,
            is_at_risk: false,
        }
    }
}

/// Tracks at-risk state per sensor. Reset only via [`SensorRiskTracker::reset`]
/// (a factory restart), never by the passage of healthy readings alone.
pub struct SensorRiskTracker {
    states: DashMap<SensorId, SensorRiskState>,
    thresholds: RiskThresholds,
}

impl SensorRiskTracker {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self {
            states: DashMap::new(),
            thresholds,
        }
    }

    /// Feed one reading. Returns `Some` exactly the first time the sensor's
    /// `low_reading_count` crosses the latch threshold — a one-shot
    /// notification, never repeated until [`reset`](Self::reset).
    pub fn track_reading(
        &self,
        sensor_id: &SensorId,
        factory_id: &FactoryId,
        reading: f64,
    ) -> Option<SensorAtRisk> {
        let mut entry = self
            .states
            .entry(sensor_id.clone())
            .or_insert_with(|| SensorRiskState::new(factory_id.clone()));

        entry.recent_readings.push_back(reading);
        while entry.recent_readings.len() > self.thresholds.at_risk_window {
            entry.recent_readings.pop_front();
        }

        if reading < self.thresholds.at_risk_reading_threshold {
            entry.low_reading_count += 1;
        } else {
            entry.low_reading_count = 0;
        }

        if entry.low_reading_count >= self.thresholds.at_risk_latch_count && !entry.is_at_risk {
            entry.is_at_risk = true;
            return Some(SensorAtRisk {
                factory_id: entry.factory_id.clone(),
                sensor_id: sensor_id.clone(),
                low_reading_count: entry.low_reading_count,
                recent_readings: entry.recent_readings.iter().copied().collect(),
                threshold: self.thresholds.at_risk_reading_threshold,
                timestamp: chrono::Utc::now(),
            });
        }
        None
    }

    pub fn is_at_risk(&self, sensor_id: &SensorId) -> bool {
        self.states.get(sensor_id).map(|s| s.is_at_risk).unwrap_or(false)
    }

    /// Clears all tracked state for a sensor, e.g. on factory restart.
    pub fn reset(&self, sensor_id: &SensorId) {
        self.states.remove(sensor_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latches_after_three_consecutive_low_readings() {
        let tracker = SensorRiskTracker::new(RiskThresholds::default());
        let sensor = SensorId::from("s1");
        let factory = FactoryId::from("f1");

        assert!(tracker.track_reading(&sensor, &factory, 80.0).is_none());
        assert!(tracker.track_reading(&sensor, &factory, 82.0).is_none());
        assert!(tracker.track_reading(&sensor, &factory, 65.0).is_none());
        assert!(tracker.track_reading(&sensor, &factory, 60.0).is_none());
        let notice = tracker.track_reading(&sensor, &factory, 55.0).unwrap();
        assert_eq!(notice.low_reading_count, 3);
        assert_eq!(notice.recent_readings, vec![80.0, 82.0, 65.0, 60.0, 55.0]);

        // Further readings, including healthy ones, must not re-notify.
        assert!(tracker.track_reading(&sensor, &factory, 50.0).is_none());
        assert!(tracker.track_reading(&sensor, &factory, 90.0).is_none());
        assert!(tracker.is_at_risk(&sensor));
    }

    #[test]
    fn reset_clears_latch() {
        let tracker = SensorRiskTracker::new(RiskThresholds::default());
        let sensor = SensorId::from("s1");
        let factory = FactoryId::from("f1");
        for r in [50.0, 40.0, 30.0] {
            tracker.track_reading(&sensor, &factory, r);
        }
        assert!(tracker.is_at_risk(&sensor));
        tracker.reset(&sensor);
        assert!(!tracker.is_at_risk(&sensor));
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `is_at_risk` is monotonic between resets: once latched, no
        /// subsequent reading sequence (short of an explicit reset) can
        /// un-latch it.
        #[test]
        fn is_at_risk_is_monotonic_between_resets(readings in prop::collection::vec(0.0f64..150.0, 0..40)) {
            let tracker = SensorRiskTracker::new(RiskThresholds::default());
            let sensor = SensorId::from("s1");
            let factory = FactoryId::from("f1");

            let mut was_at_risk = false;
            for reading in readings {
                tracker.track_reading(&sensor, &factory, reading);
                let now_at_risk = tracker.is_at_risk(&sensor);
                if was_at_risk {
                    prop_assert!(now_at_risk, "is_at_risk must not clear without an explicit reset");
                }
                was_at_risk = now_at_risk;
            }
        }

        /// Exactly one notification fires per latch: re-running the
        /// canonical three-low-readings sequence after a reset produces
        /// exactly one more notification, never zero or more than one.
        #[test]
        fn reset_allows_exactly_one_more_notification(threshold_breaching_value in 0.0f64..69.0) {
            let tracker = SensorRiskTracker::new(RiskThresholds::default());
            let sensor = SensorId::from("s1");
            let factory = FactoryId::from("f1");

            let mut notifications = 0;
            for _ in 0..3 {
                if tracker.track_reading(&sensor, &factory, threshold_breaching_value).is_some() {
                    notifications += 1;
                }
            }
            prop_assert_eq!(notifications, 1);

            tracker.reset(&sensor);
            let mut notifications_after_reset = 0;
            for _ in 0..3 {
                if tracker.track_reading(&sensor, &factory, threshold_breaching_value).is_some() {
                    notifications_after_reset += 1;
                }
            }
            prop_assert_eq!(notifications_after_reset, 1);
        }
    }
}
