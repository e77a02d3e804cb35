//! Deterministic embedder used by tests and anywhere a real provider isn't
//! wired up yet. Hashes tokens into a fixed-dimension bag-of-words vector
//! so semantically similar text produces similar vectors without pulling
//! in a real model.

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::config::Sector;
use crate::dedup::tokenize;
use crate::errors::Result;

pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_for_sector(&self, text: &str, sector: &Sector) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let h = blake3::hash(format!("{}:{token}", sector.as_str()).as_bytes());
            let idx = (h.as_bytes()[0] as usize) % self.dim;
            v[idx] += 1.0;
        }
        crate::vecmath::normalize(&mut v);
        Ok(v)
    }
}

/// An embedder that always fails, for exercising the query path's lexical
/// fallback.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_for_sector(&self, _text: &str, _sector: &Sector) -> Result<Vec<f32>> {
        Err(crate::errors::HsgError::Transient("embedder unavailable".into()))
    }

    async fn embed_query_for_all_sectors(
        &self,
        _text: &str,
        _sectors: &[Sector],
    ) -> Result<Vec<super::SectorVector>> {
        Err(crate::errors::HsgError::Transient("embedder unavailable".into()))
    }
}
