use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Sector;

/// A per-sector embedding for a memory. A memory owns zero or more of
/// these, at most one per sector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub memory_id: Uuid,
    pub sector: Sector,
    pub vector_bytes: Vec<u8>,
    pub dim: usize,
    pub tenant: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl VectorRecord {
    pub fn new(memory_id: Uuid, sector: Sector, vector_bytes: Vec<u8>, dim: usize) -> Self {
        Self {
            memory_id,
            sector,
            vector_bytes,
            dim,
            tenant: None,
            metadata: None,
        }
    }

    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }
}
