//! Sensor Health Store.
//!
//! Per-sensor last-seen and status, a per-factory membership index, and
//! timeout scanning. Each sensor's own state is mutated under a single
//! DashMap shard lock per call, which is what gives the "events on one
//! sensor are serialized" guarantee; different sensors proceed in parallel.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use fleet_common::{FactoryId, SensorId, SensorStatus};
use std::time::Duration;

/// Live state tracked for a single sensor.
#[derive(Debug, Clone)]
pub struct SensorRecord {
    pub factory_id: FactoryId,
    pub tier: String,
    pub status: SensorStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub failure_ts: Option<DateTime<Utc>>,
    pub manual_override_expiry: Option<DateTime<Utc>>,
}

impl SensorRecord {
    fn new(factory_id: FactoryId, tier: String) -> Self {
        Self {
            factory_id,
            tier,
            status: SensorStatus::Ok,
            last_seen: None,
            failure_reason: None,
            failure_ts: None,
            manual_override_expiry: None,
        }
    }

    /// `status = FAILED ⇒ failure_reason ≠ null ∧ failure_ts ≠ null`.
    fn force_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = SensorStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.failure_ts = Some(now);
    }

    fn clear_failure(&mut self) {
        self.status = SensorStatus::Ok;
        self.failure_reason = None;
        self.failure_ts = None;
        self.manual_override_expiry = None;
    }

    fn override_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.manual_override_expiry, Some(expiry) if now < expiry)
    }
}

/// Summary of sensor statuses within one factory.
#[derive(Debug, Clone, Default)]
pub struct FactorySummary {
    pub ok: Vec<SensorId>,
    pub warning: Vec<SensorId>,
    pub failed: Vec<SensorId>,
}

impl FactorySummary {
    pub fn total(&self) -> usize {
        self.ok.len() + self.warning.len() + self.failed.len()
    }
}

/// Outcome of processing one reading or heartbeat, used by callers that want
/// to react to a sensor crossing into FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub previous: SensorStatus,
    pub current: SensorStatus,
}

impl TransitionOutcome {
    pub fn newly_failed(&self) -> bool {
        self.current == SensorStatus::Failed && self.previous != SensorStatus::Failed
    }
}

/// Concurrent store of sensor health state, keyed by sensor id, with a
/// per-factory membership index for aggregation and timeout scans.
pub struct SensorHealthStore {
    sensors: DashMap<SensorId, SensorRecord>,
    factory_index: DashMap<FactoryId, DashSet<SensorId>>,
}

impl Default for SensorHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorHealthStore {
    pub fn new() -> Self {
        Self {
            sensors: DashMap::new(),
            factory_index: DashMap::new(),
        }
    }

    fn index(&self, factory_id: &FactoryId, sensor_id: &SensorId) {
        self.factory_index
            .entry(factory_id.clone())
            .or_insert_with(DashSet::new)
            .insert(sensor_id.clone());
    }

    /// Idempotent: a second registration of the same sensor is a no-op.
    pub fn register(&self, sensor_id: SensorId, factory_id: FactoryId, tier: String) {
        self.index(&factory_id, &sensor_id);
        self.sensors
            .entry(sensor_id)
            .or_insert_with(|| SensorRecord::new(factory_id, tier));
    }

    /// Updates `last_seen`. Never clears FAILED — a heartbeat alone cannot
    /// recover a failed sensor.
    pub fn on_heartbeat(
        &self,
        sensor_id: &SensorId,
        factory_id: &FactoryId,
        tier: String,
        ts: DateTime<Utc>,
    ) {
        self.index(factory_id, sensor_id);
        let mut entry = self
            .sensors
            .entry(sensor_id.clone())
            .or_insert_with(|| SensorRecord::new(factory_id.clone(), tier.clone()));
        if entry.last_seen.map_or(true, |prev| ts >= prev) {
            entry.last_seen = Some(ts);
        }
    }

    /// Updates `last_seen` and may transition `OK ↔ WARNING ↔ FAILED`
    /// according to `status`, subject to a still-active manual override.
    pub fn on_reading(
        &self,
        sensor_id: &SensorId,
        factory_id: &FactoryId,
        status: SensorStatus,
        ts: DateTime<Utc>,
    ) -> TransitionOutcome {
        self.index(factory_id, sensor_id);
        let mut entry = self
            .sensors
            .entry(sensor_id.clone())
            .or_insert_with(|| SensorRecord::new(factory_id.clone(), "unknown".into()));

        let previous = entry.status;
        let now = Utc::now();

        if entry.override_active(now) {
            // Held status wins; the incoming reading still updates last_seen.
            entry.last_seen = Some(ts);
            return TransitionOutcome {
                previous,
                current: entry.status,
            };
        }
        if entry.manual_override_expiry.is_some() {
            // Expiry has passed: drop the hold and re-evaluate normally.
            entry.manual_override_expiry = None;
        }

        entry.last_seen = Some(ts);
        match status {
            SensorStatus::Failed => entry.force_failed("Sensor reported FAILED status", now),
            other => {
                entry.status = other;
                if other != SensorStatus::Failed {
                    entry.failure_reason = None;
                    entry.failure_ts = None;
                }
            }
        }

        TransitionOutcome {
            previous,
            current: entry.status,
        }
    }

    /// Forces FAILED if not already; unconditional, always wins over a
    /// concurrent reading or scan.
    pub fn mark_failed(&self, sensor_id: &SensorId, reason: impl Into<String>) -> TransitionOutcome {
        let now = Utc::now();
        let mut entry = self.sensors.entry(sensor_id.clone()).or_insert_with(|| {
            SensorRecord::new(FactoryId::from("unknown"), "unknown".into())
        });
        let previous = entry.status;
        entry.force_failed(reason, now);
        TransitionOutcome {
            previous,
            current: entry.status,
        }
    }

    /// Sets a manual override: holds `status` until `now + duration`. Used
    /// for both FAILED and WARNING overrides; protects against auto-recovery
    /// for the duration, then expires lazily on the next reading or scan.
    pub fn override_status(&self, sensor_id: &SensorId, status: SensorStatus, duration: Duration) {
        if let Some(mut entry) = self.sensors.get_mut(sensor_id) {
            let now = Utc::now();
            entry.status = status;
            entry.manual_override_expiry =
                Some(now + ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero()));
            if status == SensorStatus::Failed {
                entry.failure_reason = Some("Manual failure trigger".into());
                entry.failure_ts = Some(now);
            }
        }
    }

    /// For every sensor with a non-null `last_seen`, if `now - last_seen >
    /// timeout` and the sensor is not already FAILED, transition it to
    /// FAILED. Returns the ids that newly failed.
    pub fn scan_timeouts(&self, timeout: Duration) -> Vec<SensorId> {
        let now = Utc::now();
        let timeout = ChronoDuration::from_std(timeout).unwrap_or(ChronoDuration::zero());
        let mut newly_failed = Vec::new();

        for mut entry in self.sensors.iter_mut() {
            let Some(last_seen) = entry.last_seen else {
                continue;
            };
            if entry.status == SensorStatus::Failed {
                continue;
            }
            let elapsed = now - last_seen;
            if elapsed > timeout {
                let secs = elapsed.num_milliseconds() as f64 / 1000.0;
                entry.force_failed(format!("heartbeat timeout {:.1}s", secs), now);
                newly_failed.push(entry.key().clone());
            }
        }
        newly_failed
    }

    /// Clears FAILED → OK for every listed sensor id belonging to `factory_id`.
    /// Safe to call twice for the same restart without side effects beyond
    /// the first call (idempotent on already-recovered sensors).
    pub fn recover_all(&self, factory_id: &FactoryId, ids: &[SensorId]) -> Vec<SensorId> {
        let mut recovered = Vec::new();
        for id in ids {
            if let Some(mut entry) = self.sensors.get_mut(id) {
                if &entry.factory_id != factory_id {
                    continue;
                }
                if entry.status == SensorStatus::Failed {
                    entry.clear_failure();
                    recovered.push(id.clone());
                } else {
                    entry.manual_override_expiry = None;
                }
            }
        }
        recovered
    }

    /// Every factory id with at least one known sensor, in no particular
    /// order. Used by the supervisor tick to enumerate factories to scan.
    pub fn factory_ids(&self) -> Vec<FactoryId> {
        self.factory_index.iter().map(|e| e.key().clone()).collect()
    }

    pub fn get_factory_summary(&self, factory_id: &FactoryId) -> FactorySummary {
        let mut summary = FactorySummary::default();
        let Some(ids) = self.factory_index.get(factory_id) else {
            return summary;
        };
        for id in ids.iter() {
            let Some(record) = self.sensors.get(id.key()) else {
                continue;
            };
            match record.status {
                SensorStatus::Ok => summary.ok.push(id.key().clone()),
                SensorStatus::Warning => summary.warning.push(id.key().clone()),
                SensorStatus::Failed => summary.failed.push(id.key().clone()),
            }
        }
        summary
    }

    /// First OK sensor of a matching tier within `factory_id`, for
    /// operational tooling; not on the failover hot path. Scoped to the
    /// factory's own membership index, mirroring the original monitor's
    /// same-factory replacement search.
    pub fn find_replacement_sensor(&self, factory_id: &FactoryId, tier: &str) -> Option<SensorId> {
        let ids = self.factory_index.get(factory_id)?;
        ids.iter().find_map(|id| {
            self.sensors.get(id.key()).and_then(|entry| {
                (entry.status == SensorStatus::Ok && entry.tier == tier)
                    .then(|| id.key().clone())
            })
        })
    }

    pub fn get_status(&self, sensor_id: &SensorId) -> Option<SensorStatus> {
        self.sensors.get(sensor_id).map(|r| r.status)
    }

    /// The factory a known sensor belongs to, for callers (ingestion) that
    /// receive a sensor-failure event without an explicit factory id.
    pub fn get_factory_id(&self, sensor_id: &SensorId) -> Option<FactoryId> {
        self.sensors.get(sensor_id).map(|r| r.factory_id.clone())
    }

    /// Clears `manual_override_expiry` for every sensor whose hold has
    /// elapsed, independent of a new reading arriving. Run periodically so
    /// overrides don't linger once idle.
    pub fn sweep_expired_overrides(&self) -> usize {
        let now = Utc::now();
        let mut cleared = 0;
        for mut entry in self.sensors.iter_mut() {
            if matches!(entry.manual_override_expiry, Some(expiry) if now >= expiry) {
                entry.manual_override_expiry = None;
                cleared += 1;
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn heartbeat_never_clears_failed() {
        let store = SensorHealthStore::new();
        let sensor = SensorId::from("s1");
        let factory = FactoryId::from("f1");
        store.register(sensor.clone(), factory.clone(), "temp".into());
        store.mark_failed(&sensor, "boom");
        store.on_heartbeat(&sensor, &factory, "temp".into(), ts(10));
        assert_eq!(store.get_status(&sensor), Some(SensorStatus::Failed));
    }

    #[test]
    fn mark_failed_is_unconditional_and_sets_reason_and_ts() {
        let store = SensorHealthStore::new();
        let sensor = SensorId::from("s1");
        let outcome = store.mark_failed(&sensor, "manual");
        assert!(outcome.newly_failed());
        assert_eq!(store.get_status(&sensor), Some(SensorStatus::Failed));
    }

    #[test]
    fn scan_timeouts_boundary_is_strict() {
        let store = SensorHealthStore::new();
        let sensor = SensorId::from("s1");
        let factory = FactoryId::from("f1");
        store.on_heartbeat(&sensor, &factory, "temp".into(), Utc::now());
        // last_seen == now, nowhere near timeout: not failed.
        let newly = store.scan_timeouts(Duration::from_secs(5));
        assert!(newly.is_empty());
    }

    #[test]
    fn override_protects_against_conflicting_reading() {
        let store = SensorHealthStore::new();
        let sensor = SensorId::from("s1");
        let factory = FactoryId::from("f1");
        store.register(sensor.clone(), factory.clone(), "temp".into());
        store.override_status(&sensor, SensorStatus::Failed, Duration::from_secs(30));
        let outcome = store.on_reading(&sensor, &factory, SensorStatus::Ok, Utc::now());
        assert_eq!(outcome.current, SensorStatus::Failed);
    }

    #[test]
    fn recover_all_clears_only_listed_factory_sensors() {
        let store = SensorHealthStore::new();
        let sensor = SensorId::from("s1");
        let other_factory_sensor = SensorId::from("s2");
        let factory = FactoryId::from("f1");
        let other_factory = FactoryId::from("f2");
        store.register(sensor.clone(), factory.clone(), "temp".into());
        store.register(other_factory_sensor.clone(), other_factory.clone(), "temp".into());
        store.mark_failed(&sensor, "x");
        store.mark_failed(&other_factory_sensor, "x");

        let recovered = store.recover_all(&factory, &[sensor.clone(), other_factory_sensor.clone()]);
        assert_eq!(recovered, vec![sensor.clone()]);
        assert_eq!(store.get_status(&sensor), Some(SensorStatus::Ok));
        assert_eq!(store.get_status(&other_factory_sensor), Some(SensorStatus::Failed));
    }

    #[test]
    fn sweep_clears_only_elapsed_overrides() {
        let store = SensorHealthStore::new();
        let sensor = SensorId::from("s1");
        let factory = FactoryId::from("f1");
        store.register(sensor.clone(), factory, "temp".into());
        store.override_status(&sensor, SensorStatus::Warning, Duration::from_secs(0));
        // duration 0 means the expiry is effectively "now", so it is already elapsed.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cleared = store.sweep_expired_overrides();
        assert_eq!(cleared, 1);
    }

    #[test]
    fn factory_ids_lists_every_known_factory() {
        let store = SensorHealthStore::new();
        store.register(SensorId::from("s1"), FactoryId::from("f1"), "temp".into());
        store.register(SensorId::from("s2"), FactoryId::from("f2"), "temp".into());
        let mut ids: Vec<String> = store.factory_ids().iter().map(|f| f.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["f1".to_string(), "f2".to_string()]);
    }

    #[test]
    fn factory_summary_counts_by_status() {
        let store = SensorHealthStore::new();
        let factory = FactoryId::from("f1");
        for i in 0..4 {
            store.register(SensorId::from(format!("s{i}")), factory.clone(), "temp".into());
        }
        store.mark_failed(&SensorId::from("s0"), "x");
        let summary = store.get_factory_summary(&factory);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.ok.len(), 3);
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Heartbeat,
        ReadingOk,
        ReadingWarning,
        ReadingFailed,
        MarkFailed,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Heartbeat),
            Just(Op::ReadingOk),
            Just(Op::ReadingWarning),
            Just(Op::ReadingFailed),
            Just(Op::MarkFailed),
        ]
    }

    proptest! {
        /// `status = FAILED ⇒ failure_reason ≠ null ∧ failure_ts ≠ null`,
        /// no matter what sequence of heartbeats/readings/failures a sensor
        /// is driven through.
        #[test]
        fn failed_always_carries_reason_and_timestamp(ops in prop::collection::vec(op_strategy(), 0..30)) {
            let store = SensorHealthStore::new();
            let sensor = SensorId::from("s1");
            let factory = FactoryId::from("f1");
            store.register(sensor.clone(), factory.clone(), "temp".into());

            for op in ops {
                match op {
                    Op::Heartbeat => store.on_heartbeat(&sensor, &factory, "temp".into(), Utc::now()),
                    Op::ReadingOk => { store.on_reading(&sensor, &factory, SensorStatus::Ok, Utc::now()); }
                    Op::ReadingWarning => { store.on_reading(&sensor, &factory, SensorStatus::Warning, Utc::now()); }
                    Op::ReadingFailed => { store.on_reading(&sensor, &factory, SensorStatus::Failed, Utc::now()); }
                    Op::MarkFailed => { store.mark_failed(&sensor, "forced"); }
                }

                let record = store.sensors.get(&sensor).unwrap();
                if record.status == SensorStatus::Failed {
                    prop_assert!(record.failure_reason.is_some());
                    prop_assert!(record.failure_ts.is_some());
                }
            }
        }

        /// A heartbeat-only sequence can never move a FAILED sensor back to
        /// OK; only `recover_all` does.
        #[test]
        fn heartbeats_never_recover_a_failed_sensor(heartbeat_count in 0usize..20) {
            let store = SensorHealthStore::new();
            let sensor = SensorId::from("s1");
            let factory = FactoryId::from("f1");
            store.register(sensor.clone(), factory.clone(), "temp".into());
            store.mark_failed(&sensor, "boom");

            for i in 0..heartbeat_count {
                store.on_heartbeat(&sensor, &factory, "temp".into(), Utc::now() + ChronoDuration::seconds(i as i64));
            }

            prop_assert_eq!(store.get_status(&sensor), Some(SensorStatus::Failed));
        }

        /// `scan_timeouts` only ever fails a sensor strictly past the
        /// timeout; a sensor seen within the window is left untouched
        /// regardless of how many sensors share the factory.
        #[test]
        fn scan_timeouts_only_touches_stale_sensors(fresh_count in 1usize..10, stale_count in 0usize..10) {
            let store = SensorHealthStore::new();
            let factory = FactoryId::from("f1");
            let timeout = Duration::from_millis(20);

            for i in 0..fresh_count {
                let id = SensorId::from(format!("fresh{i}"));
                store.on_heartbeat(&id, &factory, "temp".into(), Utc::now());
            }
            for i in 0..stale_count {
                let id = SensorId::from(format!("stale{i}"));
                store.on_heartbeat(&id, &factory, "temp".into(), Utc::now() - ChronoDuration::seconds(5));
            }

            let newly_failed = store.scan_timeouts(timeout);
            prop_assert_eq!(newly_failed.len(), stale_count);
            for i in 0..fresh_count {
                let id = SensorId::from(format!("fresh{i}"));
                prop_assert_ne!(store.get_status(&id), Some(SensorStatus::Failed));
            }
        }
    }
}
