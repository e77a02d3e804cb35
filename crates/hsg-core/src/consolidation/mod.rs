//! Background consolidation: decay sweeps, Hebbian co-activation
//! flushing, and the two mutation hooks (`reinforce_memory`,
//! `update_memory`) that keep a row's mean vector and graph position
//! current between writes.

pub mod coactivation;
pub mod decay;

use uuid::Uuid;

use crate::crypto::Encryptor;
use crate::embed::EmbeddingProvider;
use crate::errors::{HsgError, Result};
use crate::models::VectorRecord;
use crate::persistence::{PersistenceStore, Transactional, VectorStore};
use crate::vecmath;

/// `reinforceMemory(id, boost, uid)`: bumps salience, refreshes
/// `updatedAt`, leaves `lastSeenAt` untouched, and recomputes the mean
/// vector from the row's current per-sector vectors.
pub async fn reinforce_memory(
    store: &(impl PersistenceStore + VectorStore),
    id: Uuid,
    tenant: Option<&str>,
    boost: f64,
    now_ms: i64,
) -> Result<()> {
    if boost <= 0.0 {
        return Err(HsgError::InvalidArgument("boost must be positive".into()));
    }
    let memory = store
        .get_mem(id, tenant)
        .await?
        .ok_or_else(|| HsgError::NotFound(format!("memory {id}")))?;
    let new_salience = (memory.salience + boost).min(1.0);

    let vectors = store.get_vectors_by_id(id, tenant).await?;
    let decoded: Vec<Vec<f32>> = vectors
        .iter()
        .filter_map(|v| vecmath::from_bytes(&v.vector_bytes))
        .collect();
    if !decoded.is_empty() {
        let mean = vecmath::mean(&decoded);
        let bytes = vecmath::to_bytes(&mean);
        store.upd_mean_vec(id, tenant, mean.len(), &bytes).await?;
    }
    store
        .upd_seen(id, tenant, memory.last_seen_at_ms, new_salience, now_ms)
        .await?;
    Ok(())
}

/// `updateMemory`: content changes trigger full re-classification and
/// re-embedding inside one transaction; metadata-only changes skip both
/// and just touch tags/metadata.
#[allow(clippy::too_many_arguments)]
pub async fn update_memory(
    store: &(impl PersistenceStore + VectorStore + Transactional + 'static),
    encryptor: &dyn Encryptor,
    embedder: &dyn EmbeddingProvider,
    id: Uuid,
    tenant: Option<&str>,
    new_content: Option<&[u8]>,
    tags: Vec<String>,
    metadata: serde_json::Value,
    now_ms: i64,
) -> Result<()> {
    let existing = store
        .get_mem(id, tenant)
        .await?
        .ok_or_else(|| HsgError::NotFound(format!("memory {id}")))?;

    let Some(plaintext_bytes) = new_content else {
        store
            .upd_mem(id, tenant, &existing.content, &existing.primary_sector, &tags, &metadata, now_ms)
            .await?;
        return Ok(());
    };
    let plaintext = String::from_utf8_lossy(plaintext_bytes).into_owned();

    let classification = crate::classify::rule_based::classify(&plaintext);
    // Always include `semantic`, even when it isn't the primary sector, so
    // a reclassified row stays reachable from semantic candidate-gather —
    // matching write_path::prepare_one.
    let mut sectors = vec![crate::config::Sector::semantic(), classification.primary.clone()];
    sectors.extend(classification.additional.iter().cloned());
    sectors.dedup();
    let sector_vecs = embedder
        .embed_multi_sector(&id.to_string(), &plaintext, &sectors, tenant)
        .await?;
    let mean = vecmath::mean(&sector_vecs.iter().map(|s| s.vector.clone()).collect::<Vec<_>>());
    let mean_bytes = vecmath::to_bytes(&mean);
    let encrypted = encryptor.encrypt(plaintext_bytes).await?;

    let records: Vec<VectorRecord> = sector_vecs
        .into_iter()
        .map(|sv| {
            VectorRecord::new(id, sv.sector, vecmath::to_bytes(&sv.vector), sv.dim)
                .with_tenant(tenant.map(str::to_string))
        })
        .collect();

    let primary_sector = classification.primary;
    let tenant_owned = tenant.map(str::to_string);
    let delete_ids = vec![id];
    let mean_len = mean.len();

    store
        .run(move |tx| {
            tx.delete_vectors(&delete_ids, tenant_owned.as_deref())?;
            tx.insert_vectors(&records)?;
            tx.update_memory_content(id, tenant_owned.as_deref(), &encrypted, &primary_sector, &tags, &metadata, now_ms)?;
            tx.update_mean_vector(id, tenant_owned.as_deref(), mean_len, &mean_bytes)?;
            Ok(())
        })
        .await
}
