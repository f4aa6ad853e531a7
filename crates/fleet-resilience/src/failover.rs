//! Failover orchestration.
//!
//! Guards re-entrancy per factory with an RAII guard rather than a single
//! unconditional removal at the end of the happy path, so a factory id is
//! never left stuck in `active` by an early return.

use crate::pms::PmsClient;
use crate::view::FleetStatusView;
use chrono::Utc;
use dashmap::DashSet;
use fleet_common::{FactoryId, FactoryStatus, FailoverEvent, FleetResult, LegacyFactoryStatus};
use fleet_persistence::{FactoryStatusDoc, PersistencePort};
use std::sync::Arc;

const PREEMPTIVE_REBALANCE_REASON: &str = "preemptive rebalance";

/// Removes a factory id from a guarded set on drop, regardless of how the
/// enclosing scope returns.
struct ActiveGuard<'a> {
    set: &'a DashSet<FactoryId>,
    factory_id: FactoryId,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(set: &'a DashSet<FactoryId>, factory_id: FactoryId) -> Option<Self> {
        if !set.insert(factory_id.clone()) {
            return None;
        }
        Some(Self { set, factory_id })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.factory_id);
    }
}

/// Outcome of a [`FailoverOrchestrator::trigger`] call.
#[derive(Debug, Clone)]
pub struct FailoverOutcome {
    pub factory_id: FactoryId,
    pub reason: String,
    pub backup: Option<FactoryId>,
    pub pms_success: bool,
}

pub type FailoverCallback = Arc<dyn Fn(&FailoverOutcome) + Send + Sync>;

pub struct FailoverOrchestrator {
    active: DashSet<FactoryId>,
    callbacks: parking_lot::RwLock<Vec<FailoverCallback>>,
}

impl Default for FailoverOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl FailoverOrchestrator {
    pub fn new() -> Self {
        Self {
            active: DashSet::new(),
            callbacks: parking_lot::RwLock::new(Vec::new()),
        }
    }

    pub fn on_failover(&self, callback: FailoverCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn is_active(&self, factory_id: &FactoryId) -> bool {
        self.active.contains(factory_id)
    }

    pub async fn trigger(
        &self,
        factory_id: &FactoryId,
        reason: &str,
        view: &dyn FleetStatusView,
        pms: &PmsClient,
        persistence: &dyn PersistencePort,
    ) -> FleetResult<FailoverOutcome> {
        self.run(
            factory_id,
            reason,
            FactoryStatus::Down,
            view,
            pms,
            persistence,
        )
        .await
    }

    pub async fn preemptive_rebalance(
        &self,
        factory_id: &FactoryId,
        view: &dyn FleetStatusView,
        pms: &PmsClient,
        persistence: &dyn PersistencePort,
    ) -> FleetResult<FailoverOutcome> {
        self.run(
            factory_id,
            PREEMPTIVE_REBALANCE_REASON,
            FactoryStatus::Degraded,
            view,
            pms,
            persistence,
        )
        .await
    }

    async fn run(
        &self,
        factory_id: &FactoryId,
        reason: &str,
        target_status: FactoryStatus,
        view: &dyn FleetStatusView,
        pms: &PmsClient,
        persistence: &dyn PersistencePort,
    ) -> FleetResult<FailoverOutcome> {
        let Some(_guard) = ActiveGuard::acquire(&self.active, factory_id.clone()) else {
            tracing::info!(factory = %factory_id, "failover already in progress, skipping");
            return Ok(FailoverOutcome {
                factory_id: factory_id.clone(),
                reason: "already in progress".into(),
                backup: None,
                pms_success: false,
            });
        };

        let backup = select_backup(factory_id, view);

        persistence
            .append_event(FailoverEvent {
                factory_id: factory_id.clone(),
                reason: reason.to_string(),
                target: backup.clone(),
                timestamp: Utc::now(),
            })
            .await?;

        let pms_response = pms
            .report_with_retry(factory_id, target_status.to_legacy(), reason)
            .await;

        let mut doc = persistence
            .get_latest_factory_status(factory_id)
            .await?
            .unwrap_or_else(|| FactoryStatusDoc {
                factory_id: factory_id.clone(),
                status: target_status,
                legacy_status: target_status.to_legacy(),
                health_percentage: 0.0,
                ok: 0,
                warning: 0,
                failed: 0,
                total: 0,
                missed_heartbeats: 0,
                consecutive_healthy: 0,
                updated_at: Utc::now(),
            });
        doc.status = target_status;
        doc.legacy_status = target_status.to_legacy();
        doc.updated_at = Utc::now();
        persistence.upsert_factory_health(doc).await?;

        let outcome = FailoverOutcome {
            factory_id: factory_id.clone(),
            reason: reason.to_string(),
            backup,
            pms_success: pms_response.success,
        };

        for callback in self.callbacks.read().iter() {
            callback(&outcome);
        }

        Ok(outcome)
    }
}

/// Candidates are factories currently `UP` other than the failing one,
/// ordered by ascending risk rank then factory id; the first is chosen.
fn select_backup(failed: &FactoryId, view: &dyn FleetStatusView) -> Option<FactoryId> {
    let mut candidates: Vec<FactoryId> = view
        .all_factory_ids()
        .into_iter()
        .filter(|id| id != failed)
        .filter(|id| {
            view.legacy_status(id)
                .map(|s| s.is_up())
                .unwrap_or(false)
        })
        .collect();

    candidates.sort_by(|a, b| {
        let rank_a = view.risk_level(a).map(|r| r.rank()).unwrap_or(0);
        let rank_b = view.risk_level(b).map(|r| r.rank()).unwrap_or(0);
        rank_a.cmp(&rank_b).then_with(|| a.as_str().cmp(b.as_str()))
    });

    candidates.into_iter().next()
}
