//! The co-activation staging buffer and its Hebbian flush. Query-time
//! co-occurrence is cheap to record and expensive to act on immediately,
//! so pairs queue here and the maintenance tick drains them in batches.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::Waypoint;
use crate::persistence::PersistenceStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoactivationPair {
    pub tenant: Option<String>,
    pub a: String,
    pub b: String,
}

/// Bounded FIFO of pending co-activation pairs. Duplicate pairs already
/// queued are dropped rather than re-enqueued.
pub struct CoactivationBuffer {
    queue: Mutex<VecDeque<CoactivationPair>>,
    capacity: usize,
    last_flush: Mutex<Instant>,
}

impl CoactivationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            last_flush: Mutex::new(Instant::now()),
        }
    }

    /// Pushes a pair if the buffer has room and it isn't already queued.
    /// Returns whether it was pushed.
    pub async fn push(&self, tenant: Option<String>, a: String, b: String) -> bool {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.capacity {
            return false;
        }
        let candidate = CoactivationPair { tenant, a, b };
        if queue.iter().any(|p| *p == candidate) {
            return false;
        }
        queue.push_back(candidate);
        true
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the flush trigger condition holds: buffer at/above
    /// `flush_size`, or non-empty and `flush_interval_ms` has elapsed
    /// since the last flush.
    pub async fn should_flush(&self, flush_size: usize, flush_interval_ms: u64) -> bool {
        let len = self.len().await;
        if len == 0 {
            return false;
        }
        if len >= flush_size {
            return true;
        }
        let elapsed = self.last_flush.lock().await.elapsed();
        elapsed.as_millis() as u64 > flush_interval_ms
    }

    async fn drain(&self, max: usize) -> Vec<CoactivationPair> {
        let mut queue = self.queue.lock().await;
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    async fn mark_flushed(&self) {
        *self.last_flush.lock().await = Instant::now();
    }
}

/// Drains up to `max` pairs and applies the Hebbian update to each
/// existing waypoint. Pairs with no existing edge, or crossing a
/// tenant mismatch, are skipped; everything here is best-effort and
/// individual failures are logged, never propagated.
pub async fn flush(
    buffer: &CoactivationBuffer,
    store: &dyn PersistenceStore,
    max: usize,
    eta: f64,
    tau_coact_ms: f64,
    now_ms: i64,
) {
    let pairs = buffer.drain(max).await;
    for pair in pairs {
        if let Err(e) = apply_pair(store, &pair, eta, tau_coact_ms, now_ms).await {
            tracing::warn!(error = %e, a = %pair.a, b = %pair.b, "co-activation flush: failed to update pair");
        }
    }
    buffer.mark_flushed().await;
}

async fn apply_pair(
    store: &dyn PersistenceStore,
    pair: &CoactivationPair,
    eta: f64,
    tau_coact_ms: f64,
    now_ms: i64,
) -> Result<()> {
    let tenant = pair.tenant.as_deref();
    let Some(mut edge) = store.get_waypoint(&pair.a, &pair.b, tenant).await? else {
        return Ok(());
    };

    let lsa_a = last_seen(store, &pair.a, tenant).await?;
    let lsa_b = last_seen(store, &pair.b, tenant).await?;
    let (Some(lsa_a), Some(lsa_b)) = (lsa_a, lsa_b) else {
        return Ok(());
    };

    let temporal_factor = (-((lsa_a - lsa_b).abs() as f64) / tau_coact_ms).exp();
    let new_weight = (edge.weight + eta * (1.0 - edge.weight) * temporal_factor).min(1.0);
    edge.weight = new_weight;
    edge.updated_at_ms = now_ms;
    store.ins_waypoint(&edge).await
}

async fn last_seen(store: &dyn PersistenceStore, node: &str, tenant: Option<&str>) -> Result<Option<i64>> {
    let Ok(id) = Uuid::parse_str(node) else {
        // Virtual sector nodes ("<id>:<sector>") don't resolve to a row.
        return Ok(None);
    };
    Ok(store.get_mem(id, tenant).await?.map(|m| m.last_seen_at_ms))
}

#[allow(dead_code)]
fn reinforce_towards(edge: &Waypoint, eta: f64, temporal_factor: f64) -> f64 {
    (edge.weight + eta * (1.0 - edge.weight) * temporal_factor).min(1.0)
}
