//! Backpressure-aware staging for heartbeat persistence writes.
//!
//! The ingestion loop's hot path never blocks on a persistence write: a
//! heartbeat is pushed onto a bounded queue and a separate flush task drains
//! it. Per §5, when persistence falls behind the loop drops the *oldest*
//! queued heartbeat rather than stalling or dropping the newest arrival.

use fleet_common::HeartbeatRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;

const DEFAULT_CAPACITY: usize = 4096;

pub struct HeartbeatQueue {
    capacity: usize,
    queue: Mutex<VecDeque<HeartbeatRecord>>,
}

impl Default for HeartbeatQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HeartbeatQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
        }
    }

    /// Enqueue a record, evicting the oldest queued one if already at
    /// capacity. Returns `true` if an eviction happened.
    pub fn push(&self, record: HeartbeatRecord) -> bool {
        let mut queue = self.queue.lock();
        let evicted = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(record);
        evicted
    }

    /// Drain up to `max` queued records, oldest first.
    pub fn drain(&self, max: usize) -> Vec<HeartbeatRecord> {
        let mut queue = self.queue.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_common::{FactoryId, SensorId};

    fn record(n: u32) -> HeartbeatRecord {
        HeartbeatRecord {
            sensor_id: SensorId::from(format!("s{n}")),
            factory_id: FactoryId::from("f1"),
            tier: "temp".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let queue = HeartbeatQueue::new(2);
        assert!(!queue.push(record(1)));
        assert!(!queue.push(record(2)));
        assert!(queue.push(record(3)));
        let drained = queue.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].sensor_id.as_str(), "s2");
        assert_eq!(drained[1].sensor_id.as_str(), "s3");
    }
}
