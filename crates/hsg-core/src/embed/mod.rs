//! The embedding provider contract. The engine ships no inference code —
//! callers supply a provider (local model, remote API, or a test double).

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;

use crate::config::Sector;
use crate::errors::Result;

/// One sector's embedding of some text.
#[derive(Debug, Clone)]
pub struct SectorVector {
    pub sector: Sector,
    pub vector: Vec<f32>,
    pub dim: usize,
}

/// Maps text to per-sector vectors. Dimensions per sector are assumed
/// stable for the life of the process.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text` into a single sector's space.
    async fn embed_for_sector(&self, text: &str, sector: &Sector) -> Result<Vec<f32>>;

    /// Embed `text` into several sectors at once, tagged with a memory id
    /// for providers that batch or cache by id.
    async fn embed_multi_sector(
        &self,
        memory_id: &str,
        text: &str,
        sectors: &[Sector],
        tenant: Option<&str>,
    ) -> Result<Vec<SectorVector>> {
        let mut out = Vec::with_capacity(sectors.len());
        for sector in sectors {
            let vector = self.embed_for_sector(text, sector).await?;
            out.push(SectorVector {
                dim: vector.len(),
                sector: sector.clone(),
                vector,
            });
        }
        let _ = (memory_id, tenant);
        Ok(out)
    }

    /// Embed a query for every candidate sector at once. Returning `Err`
    /// signals the query path to fall back to a lexical-only search.
    async fn embed_query_for_all_sectors(
        &self,
        text: &str,
        sectors: &[Sector],
    ) -> Result<Vec<SectorVector>> {
        self.embed_multi_sector("query", text, sectors, None).await
    }
}
