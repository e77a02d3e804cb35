//! Dual-phase salience decay: a short, steep first phase followed by a
//! slower long-tail phase, parameterized by each row's own `decayLambda`.

use crate::models::clamp_unit;
use crate::persistence::PersistenceStore;

/// Length of the fast phase, in days. Age beyond this point decays at
/// the row's plain λ; age within it decays at `FAST_MULTIPLIER · λ`.
const FAST_PHASE_DAYS: f64 = 1.0;
/// How much steeper the fast phase is than the base rate.
const FAST_MULTIPLIER: f64 = 4.0;

/// `newSal = dualPhaseDecay(salience, ageDaysSinceLastSeen, decayLambda)`.
/// Monotonically non-increasing in `age_days` for fixed `salience` and
/// `decay_lambda`, since it's salience scaled by a continuous, strictly
/// decreasing factor.
pub fn dual_phase_decay(salience: f64, age_days: f64, decay_lambda: f64) -> f64 {
    if age_days <= 0.0 {
        return clamp_unit(salience);
    }
    let lambda = decay_lambda.max(f64::MIN_POSITIVE);
    let factor = if age_days <= FAST_PHASE_DAYS {
        (-lambda * FAST_MULTIPLIER * age_days).exp()
    } else {
        let fast_leg = (-lambda * FAST_MULTIPLIER * FAST_PHASE_DAYS).exp();
        let slow_leg = (-lambda * (age_days - FAST_PHASE_DAYS)).exp();
        fast_leg * slow_leg
    };
    clamp_unit(salience * factor)
}

/// Sweeps every row and persists its decayed salience. `lastSeenAt` is
/// never mutated by decay. Best-effort: a single row's failure is
/// logged and the sweep continues.
pub async fn sweep(store: &dyn PersistenceStore, ids: &[uuid::Uuid], tenant: Option<&str>, now_ms: i64) {
    for &id in ids {
        let memory = match store.get_mem(id, tenant).await {
            Ok(Some(m)) => m,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, %id, "decay sweep: failed to load memory");
                continue;
            }
        };
        let age_days = memory.age_days(now_ms);
        let new_salience = dual_phase_decay(memory.salience, age_days, memory.decay_lambda);
        if let Err(e) = store
            .upd_seen(id, tenant, memory.last_seen_at_ms, new_salience, memory.updated_at_ms)
            .await
        {
            tracing::warn!(error = %e, %id, "decay sweep: failed to persist salience");
        }
    }
}
