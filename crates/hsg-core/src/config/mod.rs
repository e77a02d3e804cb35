//! Engine configuration.
//!
//! Construct with [`EngineConfig::default`] for tests (which also sets
//! `is_test` so the maintenance ticker never starts), or load a TOML file
//! with [`EngineConfig::from_toml_str`].

mod sector;

pub use sector::{Sector, SectorConfig, SectorTable};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weights and constants for the hybrid score blend. Exposed as config
/// rather than baked in, since the right mix is workload-dependent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridParams {
    /// Saturation-map time constant applied before the final clamp.
    pub tau: f64,
    /// Hebbian learning rate used by the co-activation flush.
    pub eta: f64,
    /// Weight of vector fusion score in the hybrid blend.
    pub w_fusion: f64,
    /// Weight of decayed salience in the hybrid blend.
    pub w_salience: f64,
    /// Weight of lexical token overlap in the hybrid blend.
    pub w_overlap: f64,
    /// Weight of recency score in the hybrid blend.
    pub w_recency: f64,
    /// Weight of tag match score in the hybrid blend.
    pub w_tag: f64,
    /// Weight of spreading-activation graph weight in the hybrid blend.
    pub w_graph: f64,
    /// Recency half-life-like time constant, in milliseconds.
    pub recency_tau_ms: f64,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            tau: 1.5,
            eta: 0.2,
            w_fusion: 0.35,
            w_salience: 0.2,
            w_overlap: 0.15,
            w_recency: 0.1,
            w_tag: 0.1,
            w_graph: 0.1,
            recency_tau_ms: 7.0 * 86_400_000.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Per-sector decay/weight/dimension table.
    pub sectors: SectorTable,
    /// Hybrid score weights and constants.
    pub hybrid_params: HybridParams,
    /// Query result cache TTL, milliseconds.
    pub hsg_cache_ttl_ms: u64,
    /// Query result cache capacity.
    pub hsg_cache_capacity: u64,
    /// Classifier model cache capacity (per-tenant models held in memory).
    pub classifier_cache_capacity: u64,
    /// Multiplicative boost applied by `reinforceWaypoints`.
    pub reinf_waypoint_boost: f64,
    /// Probability threshold above which the learned classifier overrides
    /// a default (`semantic`) rule-based classification.
    pub classifier_override_threshold: f64,
    /// Waypoint weight at/below which pruning deletes the edge.
    pub prune_threshold: f64,
    /// Co-activation buffer capacity.
    pub coactivation_capacity: usize,
    /// Co-activation flush trigger: size threshold.
    pub coactivation_flush_size: usize,
    /// Co-activation flush trigger: elapsed-time threshold, milliseconds.
    pub coactivation_flush_interval_ms: u64,
    /// Co-activation temporal factor time constant, milliseconds (default 24h).
    pub coactivation_tau_ms: f64,
    /// Maintenance tick period, milliseconds.
    pub maintenance_tick_ms: u64,
    /// Suppresses background timers; set by test harnesses.
    pub is_test: bool,
    /// Extra, implementation-defined options preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, toml::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sectors: SectorTable::default(),
            hybrid_params: HybridParams::default(),
            hsg_cache_ttl_ms: 60_000,
            hsg_cache_capacity: 500,
            classifier_cache_capacity: 100,
            reinf_waypoint_boost: 0.1,
            classifier_override_threshold: 0.6,
            prune_threshold: 0.1,
            coactivation_capacity: 500,
            coactivation_flush_size: 50,
            coactivation_flush_interval_ms: 60_000,
            coactivation_tau_ms: 24.0 * 3_600_000.0,
            maintenance_tick_ms: 1_000,
            is_test: false,
            extra: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// A config suitable for unit/integration tests: same defaults, with
    /// `is_test` forced on.
    pub fn for_test() -> Self {
        Self {
            is_test: true,
            ..Default::default()
        }
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(s: &str) -> crate::errors::Result<Self> {
        toml::from_str(s)
            .map_err(|e| crate::errors::HsgError::InvalidArgument(format!("bad config: {e}")))
    }
}
