//! PMS RPC Port: reports factory status to the external production
//! management system, with bounded exponential backoff and circuit breaking.

use crate::circuit::CircuitBreaker;
use async_trait::async_trait;
use fleet_common::{FactoryId, FleetResult, LegacyFactoryStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_SECS: f64 = 0.5;

/// Response envelope every orchestration operation that touches PMS returns.
#[derive(Debug, Clone, PartialEq)]
pub struct PmsResponse {
    pub success: bool,
    pub message: String,
    pub orders_rescheduled: Option<u32>,
}

/// The single PMS operation this core depends on. The concrete PMS service
/// is an external collaborator; this trait is the whole of the contract.
#[async_trait]
pub trait PmsPort: Send + Sync {
    async fn report_status(
        &self,
        factory_id: &FactoryId,
        status: LegacyFactoryStatus,
        reason: &str,
    ) -> FleetResult<PmsResponse>;
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs_f64(BASE_DELAY_SECS * 2f64.powi(attempt as i32 - 1))
}

/// Wraps a [`PmsPort`] with bounded retry and a circuit breaker. This is
/// what orchestrators actually call.
pub struct PmsClient {
    inner: Box<dyn PmsPort>,
    circuit: CircuitBreaker,
}

impl PmsClient {
    pub fn new(inner: Box<dyn PmsPort>) -> Self {
        Self {
            inner,
            circuit: CircuitBreaker::new(),
        }
    }

    /// Reports status with up to [`MAX_ATTEMPTS`] attempts, base-0.5s
    /// exponential backoff between them. Fails fast with a
    /// `{success:false}` envelope while the circuit is open; never
    /// propagates a transport error past this call — the envelope always
    /// carries the outcome.
    pub async fn report_with_retry(
        &self,
        factory_id: &FactoryId,
        status: LegacyFactoryStatus,
        reason: &str,
    ) -> PmsResponse {
        let mut last_message = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if !self.circuit.allow_request() {
                tracing::warn!(factory = %factory_id, "PMS circuit breaker open, failing fast");
                return PmsResponse {
                    success: false,
                    message: "Circuit breaker open".into(),
                    orders_rescheduled: None,
                };
            }

            match self.inner.report_status(factory_id, status, reason).await {
                Ok(resp) if resp.success => {
                    self.circuit.record_success();
                    return resp;
                }
                Ok(resp) => {
                    self.circuit.record_failure();
                    last_message = resp.message;
                }
                Err(err) => {
                    self.circuit.record_failure();
                    last_message = err.to_string();
                }
            }

            if attempt < MAX_ATTEMPTS {
                tracing::warn!(factory = %factory_id, attempt, max = MAX_ATTEMPTS, "PMS report attempt failed, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        tracing::error!(factory = %factory_id, "all PMS retry attempts failed");
        PmsResponse {
            success: false,
            message: format!("All retries failed: {last_message}"),
            orders_rescheduled: None,
        }
    }
}

/// In-memory mock PMS, for tests and standalone operation. Always
/// succeeds; call [`MockPms::fail_next`] to script failures.
pub struct MockPms {
    remaining_failures: AtomicU32,
    orders_rescheduled: u32,
}

impl Default for MockPms {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPms {
    pub fn new() -> Self {
        Self {
            remaining_failures: AtomicU32::new(0),
            orders_rescheduled: 4,
        }
    }

    /// Scripts the next `n` calls to fail.
    pub fn fail_next(&self, n: u32) {
        self.remaining_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PmsPort for MockPms {
    async fn report_status(
        &self,
        _factory_id: &FactoryId,
        _status: LegacyFactoryStatus,
        _reason: &str,
    ) -> FleetResult<PmsResponse> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Ok(PmsResponse {
                success: false,
                message: "simulated PMS failure".into(),
                orders_rescheduled: None,
            });
        }
        Ok(PmsResponse {
            success: true,
            message: "Status updated".into(),
            orders_rescheduled: Some(self.orders_rescheduled),
        })
    }
}
