//! Circuit breaker guarding the PMS RPC port.
//!
//! Opens after 3 consecutive failures, half-opens (lets one attempt through)
//! after 30 seconds, and closes again on that attempt's success.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, Instant};

const FAILURE_THRESHOLD: u32 = 3;
const OPEN_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    state: Mutex<State>,
    opened_at: Mutex<Option<Instant>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(State::Closed),
            opened_at: Mutex::new(None),
        }
    }

    /// Whether a call is currently allowed through. Transitions Open →
    /// HalfOpen once the open duration has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Closed => true,
            State::HalfOpen => true,
            State::Open => {
                let opened_at = *self.opened_at.lock();
                if opened_at.map_or(false, |t| t.elapsed() >= OPEN_DURATION) {
                    *state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.state.lock() = State::Closed;
        *self.opened_at.lock() = None;
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        if *state == State::HalfOpen || failures >= FAILURE_THRESHOLD {
            *state = State::Open;
            *self.opened_at.lock() = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        !self.allow_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert!(!cb.allow_request());
    }

    #[test]
    fn success_closes_the_circuit() {
        let cb = CircuitBreaker::new();
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.is_open());
        // Simulate reaching half-open then succeeding, without sleeping 30s
        // in the test: drive the transition directly.
        *cb.state.lock() = State::HalfOpen;
        cb.record_success();
        assert!(!cb.is_open());
    }
}
