use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Sector;

/// The atomic content entity. Content is stored as an already-encrypted
/// blob — this type never holds plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: Uuid,
    /// `None` for system-wide memories not scoped to a tenant.
    pub tenant: Option<String>,
    pub content: Vec<u8>,
    pub primary_sector: Sector,
    pub tags: Vec<String>,
    /// Opaque metadata map; unknown fields round-trip via `serde_json::Value`.
    pub metadata: serde_json::Value,
    pub segment: i64,
    pub simhash: u64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub last_seen_at_ms: i64,
    pub salience: f64,
    pub decay_lambda: f64,
    pub version: i64,
    pub dim: usize,
    pub mean_vector: Vec<u8>,
    pub compressed_vector: Vec<u8>,
    pub feedback_score: i64,
    pub generated_summary: Option<String>,
}

impl Memory {
    /// Build a new row for insertion. `salience` and `decay_lambda` are
    /// clamped/validated by the caller (write path); this constructor just
    /// assembles the fields with version 1 and all timestamps equal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        tenant: Option<String>,
        content: Vec<u8>,
        primary_sector: Sector,
        tags: Vec<String>,
        metadata: serde_json::Value,
        simhash: u64,
        now_ms: i64,
        salience: f64,
        decay_lambda: f64,
        dim: usize,
        mean_vector: Vec<u8>,
    ) -> Self {
        Self {
            id,
            tenant,
            content,
            primary_sector,
            tags,
            metadata,
            segment: 0,
            simhash,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            last_seen_at_ms: now_ms,
            salience: clamp_unit(salience),
            decay_lambda: decay_lambda.max(f64::MIN_POSITIVE),
            version: 1,
            dim,
            compressed_vector: mean_vector.clone(),
            mean_vector,
            feedback_score: 0,
            generated_summary: None,
        }
    }

    /// Clamp and set salience, the invariant enforced on every write, decay,
    /// or reinforcement.
    pub fn set_salience(&mut self, salience: f64) {
        self.salience = clamp_unit(salience);
    }

    /// Bump salience toward 1.0 by `boost` and refresh `last_seen_at_ms`,
    /// leaving `updated_at_ms` untouched (the write path sets that on
    /// content/metadata changes only).
    pub fn touch_seen(&mut self, now_ms: i64, salience_boost: f64) {
        self.last_seen_at_ms = now_ms;
        self.set_salience(self.salience + salience_boost);
    }

    /// Monotonically bump the row version, used whenever content or vectors
    /// change.
    pub fn bump_version(&mut self, now_ms: i64) {
        self.version += 1;
        self.updated_at_ms = now_ms;
    }

    pub fn age_days(&self, now_ms: i64) -> f64 {
        ((now_ms - self.last_seen_at_ms).max(0) as f64) / 86_400_000.0
    }
}

pub fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salience_clamps_to_unit_interval() {
        let mut m = Memory::new(
            Uuid::new_v4(),
            None,
            vec![],
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            42,
            0,
            2.0,
            0.02,
            3,
            vec![0; 12],
        );
        assert_eq!(m.salience, 1.0);
        m.set_salience(-5.0);
        assert_eq!(m.salience, 0.0);
    }

    #[test]
    fn decay_lambda_never_zero() {
        let m = Memory::new(
            Uuid::new_v4(),
            None,
            vec![],
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            42,
            0,
            0.5,
            0.0,
            3,
            vec![0; 12],
        );
        assert!(m.decay_lambda > 0.0);
    }

    #[test]
    fn touch_seen_bounds_salience_at_one() {
        let mut m = Memory::new(
            Uuid::new_v4(),
            None,
            vec![],
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            42,
            0,
            0.95,
            0.02,
            3,
            vec![0; 12],
        );
        m.touch_seen(1_000, 0.5);
        assert_eq!(m.salience, 1.0);
        assert_eq!(m.last_seen_at_ms, 1_000);
    }
}
