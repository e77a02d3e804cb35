//! The maintenance tick loop: periodic decay sweeps, co-activation
//! flushing, and waypoint pruning. `EngineConfig::is_test` suppresses the
//! ticker entirely so unit/integration tests never race a background task.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::consolidation::coactivation::{self, CoactivationBuffer};
use crate::consolidation::decay;
use crate::events::{EventBus, HsgEvent, MaintenanceOp};
use crate::persistence::PersistenceStore;

/// Upper bound on rows swept per tick, per tenant — keeps one tick bounded
/// even on a large tenant.
const DECAY_SWEEP_BATCH: usize = 1_000;

/// Scopes a maintenance tick to a fixed set of tenants. The engine owns
/// the authoritative tenant list; the scheduler has no way to discover
/// tenants on its own.
#[derive(Debug, Clone)]
pub struct MaintenanceScope {
    pub tenants: Vec<Option<String>>,
}

impl MaintenanceScope {
    pub fn single(tenant: Option<String>) -> Self {
        Self { tenants: vec![tenant] }
    }
}

impl Default for MaintenanceScope {
    /// The untenanted scope (`tenant IS NULL`) — correct for single-tenant
    /// deployments and for exercising maintenance in tests without an
    /// explicit tenant list.
    fn default() -> Self {
        Self { tenants: vec![None] }
    }
}

/// Runs one maintenance tick: co-activation flush (if due), a decay sweep
/// per scoped tenant, and waypoint pruning. Every step is best-effort —
/// a failure in one is logged and the tick continues.
pub async fn run_tick(
    store: &(impl PersistenceStore + Send + Sync),
    config: &EngineConfig,
    coactivation: &CoactivationBuffer,
    events: &EventBus,
    scope: &MaintenanceScope,
    now_ms: i64,
) {
    if coactivation
        .should_flush(config.coactivation_flush_size, config.coactivation_flush_interval_ms)
        .await
    {
        coactivation::flush(
            coactivation,
            store,
            config.coactivation_flush_size.max(1) * 4,
            config.hybrid_params.eta,
            config.coactivation_tau_ms,
            now_ms,
        )
        .await;
        events.publish(HsgEvent::MaintenanceOp {
            op: MaintenanceOp::CoactivationFlush,
        });
    }

    for tenant in &scope.tenants {
        let rows = match store.list_mems_for_tenant(tenant.as_deref(), DECAY_SWEEP_BATCH).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, ?tenant, "maintenance tick: failed to list rows for decay sweep");
                continue;
            }
        };
        let ids: Vec<_> = rows.iter().map(|m| m.id).collect();
        decay::sweep(store, &ids, tenant.as_deref(), now_ms).await;
    }
    events.publish(HsgEvent::MaintenanceOp {
        op: MaintenanceOp::DecaySweep,
    });

    for tenant in &scope.tenants {
        match crate::graph::prune(store, config.prune_threshold, tenant.as_deref()).await {
            Ok(n) if n > 0 => tracing::debug!(pruned = n, ?tenant, "maintenance tick: pruned waypoints"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, ?tenant, "maintenance tick: waypoint prune failed"),
        }
    }
    events.publish(HsgEvent::MaintenanceOp {
        op: MaintenanceOp::WaypointPrune,
    });
}

/// Spawns the periodic maintenance loop as a background task, returning
/// its handle. Callers should `abort()` the handle (or let `HsgEngine`
/// do so) on shutdown. Never spawned when `config.is_test` is set.
pub fn spawn(
    store: Arc<dyn PersistenceStore>,
    config: Arc<EngineConfig>,
    coactivation: Arc<CoactivationBuffer>,
    events: Arc<EventBus>,
    scope: MaintenanceScope,
) -> Option<tokio::task::JoinHandle<()>> {
    if config.is_test {
        return None;
    }
    let tick_ms = config.maintenance_tick_ms.max(1);
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            let now_ms = chrono::Utc::now().timestamp_millis();
            run_tick(store.as_ref(), &config, &coactivation, &events, &scope, now_ms).await;
        }
    }))
}
