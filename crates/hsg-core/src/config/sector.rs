//! The sector vocabulary: a small set of cognitive categories a memory is
//! classified into, each with its own decay rate and embedding dimension.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cognitive sector name. Newtype around `String` rather than an enum:
/// the five built-ins are seeded by default but additional domain sectors
/// are declared in config, not compiled in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sector(pub String);

impl Sector {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn semantic() -> Self {
        Self::new("semantic")
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Sector {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-sector configuration: decay rate, fusion weight, embedding dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorConfig {
    /// Per-day decay lambda, in `(0, 1)`.
    pub decay_lambda: f64,
    /// Weight of this sector's similarity in the fusion score.
    pub fusion_weight: f64,
    /// Embedding dimension for this sector.
    pub dim: usize,
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self {
            decay_lambda: 0.02,
            fusion_weight: 1.0,
            dim: 256,
        }
    }
}

/// The fixed (at startup) table of known sectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorTable {
    entries: HashMap<String, SectorConfig>,
}

impl Default for SectorTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "semantic".to_string(),
            SectorConfig {
                decay_lambda: 0.015,
                fusion_weight: 1.0,
                dim: 256,
            },
        );
        entries.insert(
            "emotional".to_string(),
            SectorConfig {
                decay_lambda: 0.04,
                fusion_weight: 0.8,
                dim: 256,
            },
        );
        entries.insert(
            "procedural".to_string(),
            SectorConfig {
                decay_lambda: 0.005,
                fusion_weight: 0.9,
                dim: 256,
            },
        );
        entries.insert(
            "episodic".to_string(),
            SectorConfig {
                decay_lambda: 0.06,
                fusion_weight: 0.7,
                dim: 256,
            },
        );
        entries.insert(
            "reflective".to_string(),
            SectorConfig {
                decay_lambda: 0.03,
                fusion_weight: 0.85,
                dim: 256,
            },
        );
        Self { entries }
    }
}

impl SectorTable {
    /// Look up a sector's config, falling back to `SectorConfig::default()`
    /// for sectors the table doesn't know about yet (a permissive default
    /// rather than an error — the classifier may name additional domain
    /// sectors not yet declared).
    pub fn get(&self, sector: &Sector) -> SectorConfig {
        self.entries
            .get(sector.as_str())
            .copied()
            .unwrap_or_default()
    }

    pub fn insert(&mut self, sector: Sector, config: SectorConfig) {
        self.entries.insert(sector.0, config);
    }

    pub fn contains(&self, sector: &Sector) -> bool {
        self.entries.contains_key(sector.as_str())
    }

    pub fn known_sectors(&self) -> impl Iterator<Item = Sector> + '_ {
        self.entries.keys().cloned().map(Sector)
    }
}
