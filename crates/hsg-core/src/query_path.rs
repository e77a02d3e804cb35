//! `hsg_query`: cache lookup, classification, per-sector vector search,
//! spreading activation, and hybrid-score ranking.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::TtlLru;
use crate::classify::rule_based;
use crate::config::{EngineConfig, Sector};
use crate::consolidation::coactivation::CoactivationBuffer;
use crate::consolidation::decay::dual_phase_decay;
use crate::crypto::Encryptor;
use crate::dedup::tokenize;
use crate::embed::EmbeddingProvider;
use crate::errors::Result;
use crate::graph;
use crate::models::{Memory, VectorRecord};
use crate::persistence::{PersistenceStore, VectorStore};
use crate::vecmath;

/// Candidate pool size for the lexical fallback scan.
const LEXICAL_FALLBACK_POOL: usize = 500;
/// Co-activation pairs emitted per seed from a top-k result.
const COACTIVATION_PAIRS_PER_SEED: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryFilters {
    pub sectors: Option<Vec<Sector>>,
    pub min_salience: Option<f64>,
    pub tenant: Option<String>,
    pub time_from_ms: Option<i64>,
    pub time_to_ms: Option<i64>,
    /// A single exact-match metadata constraint: `metadata[key] == value`.
    pub metadata_equals: Option<(String, serde_json::Value)>,
}

/// One ranked result: the decrypted content, its sector at match time, and
/// the hybrid score it ranked on.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: Uuid,
    pub tenant: Option<String>,
    pub sector: Sector,
    pub score: f64,
    pub content: Vec<u8>,
}

/// The consolidation hook invoked per top-k result. Errors are logged and
/// swallowed by the caller — a hook failure never fails the query.
#[async_trait]
pub trait QueryHitHook: Send + Sync {
    async fn on_query_hit(&self, id: Uuid, sector: &Sector, tenant: Option<&str>) -> Result<()>;
}

fn cache_key(query: &str, k: usize, filters: &QueryFilters) -> String {
    let mut normalized = filters.clone();
    if let Some(sectors) = normalized.sectors.as_mut() {
        sectors.sort();
    }
    let payload = serde_json::json!({ "q": query, "k": k, "f": normalized });
    let serialized = serde_json::to_string(&payload).unwrap_or_default();
    blake3::hash(serialized.as_bytes()).to_hex().to_string()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn tag_match_score(query_tokens: &HashSet<String>, tags: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let tag_set: HashSet<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let matches = query_tokens.iter().filter(|t| tag_set.contains(*t)).count();
    matches as f64 / query_tokens.len() as f64
}

fn fusion_score(query_vectors: &HashMap<Sector, Vec<f32>>, vectors: &[VectorRecord], config: &EngineConfig) -> f32 {
    let mut weighted_sum = 0.0f32;
    let mut weight_total = 0.0f32;
    for v in vectors {
        let Some(query_vec) = query_vectors.get(&v.sector) else {
            continue;
        };
        let Some(stored) = vecmath::from_bytes(&v.vector_bytes) else {
            continue;
        };
        let sim = vecmath::cosine_similarity(query_vec, &stored);
        let weight = config.sectors.get(&v.sector).fusion_weight as f32;
        weighted_sum += sim * weight;
        weight_total += weight;
    }
    if weight_total <= 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

/// Bounded, monotone-in-`mvf` multiplier: memories in the query's primary
/// sector resonate more strongly than cross-sector matches at the same
/// fusion score.
fn resonance_factor(memory_sector: &Sector, query_primary_sector: &Sector, mvf: f32) -> f64 {
    let mvf = mvf.clamp(0.0, 1.0) as f64;
    if memory_sector == query_primary_sector {
        0.5 + 0.5 * mvf
    } else {
        0.3 + 0.3 * mvf
    }
}

fn passes_filters(memory: &Memory, filters: &QueryFilters) -> bool {
    if let Some(sectors) = &filters.sectors {
        if !sectors.contains(&memory.primary_sector) {
            return false;
        }
    }
    if let Some(min_salience) = filters.min_salience {
        if memory.salience < min_salience {
            return false;
        }
    }
    if let Some(from) = filters.time_from_ms {
        if memory.created_at_ms < from {
            return false;
        }
    }
    if let Some(to) = filters.time_to_ms {
        if memory.created_at_ms > to {
            return false;
        }
    }
    if let Some((key, expected)) = &filters.metadata_equals {
        if memory.metadata.get(key) != Some(expected) {
            return false;
        }
    }
    true
}

async fn lexical_fallback(
    store: &impl PersistenceStore,
    encryptor: &dyn Encryptor,
    query: &str,
    k: usize,
    filters: &QueryFilters,
) -> Result<Vec<QueryHit>> {
    let pool = store.list_mems_for_tenant(filters.tenant.as_deref(), LEXICAL_FALLBACK_POOL).await?;
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    let mut hits = Vec::new();
    for memory in pool {
        if !passes_filters(&memory, filters) {
            continue;
        }
        let plaintext = encryptor.decrypt(&memory.content).await.unwrap_or_default();
        let content_tokens: HashSet<String> = tokenize(&String::from_utf8_lossy(&plaintext)).into_iter().collect();
        if query_tokens.intersection(&content_tokens).next().is_none() {
            continue;
        }
        hits.push(QueryHit {
            id: memory.id,
            tenant: memory.tenant,
            sector: memory.primary_sector,
            score: 0.5,
            content: plaintext,
        });
        if hits.len() >= k {
            break;
        }
    }
    Ok(hits)
}

#[allow(clippy::too_many_arguments)]
pub async fn hsg_query(
    store: &(impl PersistenceStore + VectorStore),
    encryptor: &dyn Encryptor,
    embedder: &dyn EmbeddingProvider,
    config: &EngineConfig,
    cache: &TtlLru<String, Vec<QueryHit>>,
    coactivation: &CoactivationBuffer,
    hook: Option<&dyn QueryHitHook>,
    query: &str,
    k: usize,
    filters: QueryFilters,
    now_ms: i64,
) -> Result<Vec<QueryHit>> {
    let key = cache_key(query, k, &filters);
    if let Some(cached) = cache.get(&key) {
        return Ok(cached);
    }

    let classification = rule_based::classify(query);
    let mut candidate_sectors = vec![classification.primary.clone()];
    candidate_sectors.extend(classification.additional.iter().cloned());
    if let Some(filter_sectors) = &filters.sectors {
        candidate_sectors.extend(filter_sectors.iter().cloned());
    }
    candidate_sectors.sort();
    candidate_sectors.dedup();

    let query_vecs = match embedder.embed_query_for_all_sectors(query, &candidate_sectors).await {
        Ok(vecs) => vecs,
        Err(e) => {
            tracing::warn!(error = %e, "embedder unavailable, falling back to lexical search");
            let hits = lexical_fallback(store, encryptor, query, k, &filters).await?;
            cache.set(key, hits.clone());
            return Ok(hits);
        }
    };

    let mut query_vectors: HashMap<Sector, Vec<f32>> = HashMap::new();
    let mut candidates: HashMap<Uuid, (f32, Sector)> = HashMap::new();
    for sv in &query_vecs {
        query_vectors.insert(sv.sector.clone(), sv.vector.clone());
        let hits = store.search_similar(&sv.sector, &sv.vector, 2 * k, filters.tenant.as_deref()).await?;
        for (id, score) in hits {
            candidates
                .entry(id)
                .and_modify(|existing| {
                    if score > existing.0 {
                        *existing = (score, sv.sector.clone());
                    }
                })
                .or_insert((score, sv.sector.clone()));
        }
    }

    if candidates.is_empty() {
        cache.set(key, Vec::new());
        return Ok(Vec::new());
    }

    let candidate_ids: Vec<Uuid> = candidates.keys().copied().collect();
    let rows: Vec<Memory> = store
        .get_mems(&candidate_ids)
        .await?
        .into_iter()
        .filter(|m| passes_filters(m, &filters))
        .collect();

    let mut vectors_by_id: HashMap<Uuid, Vec<VectorRecord>> = HashMap::with_capacity(rows.len());
    for memory in &rows {
        let vectors = store.get_vectors_by_id(memory.id, memory.tenant.as_deref()).await?;
        vectors_by_id.insert(memory.id, vectors);
    }

    let seeds: Vec<String> = rows.iter().map(|m| m.id.to_string()).collect();
    let activation = graph::spreading_activation(store, &seeds, filters.tenant.as_deref())
        .await
        .unwrap_or_default();

    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    let hybrid = &config.hybrid_params;

    let mut scored: Vec<(f64, QueryHit)> = Vec::with_capacity(rows.len());
    for memory in &rows {
        let empty = Vec::new();
        let vectors = vectors_by_id.get(&memory.id).unwrap_or(&empty);
        let mvf = fusion_score(&query_vectors, vectors, config);
        let resonance = resonance_factor(&memory.primary_sector, &classification.primary, mvf);

        let age_days = memory.age_days(now_ms);
        let decayed_salience = dual_phase_decay(memory.salience, age_days, memory.decay_lambda);

        let plaintext = encryptor.decrypt(&memory.content).await.unwrap_or_default();
        let content_tokens: HashSet<String> = tokenize(&String::from_utf8_lossy(&plaintext)).into_iter().collect();
        let overlap = jaccard(&query_tokens, &content_tokens);

        let delta_t = (now_ms - memory.last_seen_at_ms).max(0) as f64;
        let recency = (-delta_t / hybrid.recency_tau_ms).exp();
        let tag_match = tag_match_score(&query_tokens, &memory.tags);
        let graph_weight = activation.get(&memory.id.to_string()).map(|a| a.weight).unwrap_or(0.0);

        let blended = hybrid.w_fusion * mvf as f64
            + hybrid.w_salience * decayed_salience
            + hybrid.w_overlap * overlap
            + hybrid.w_recency * recency
            + hybrid.w_tag * tag_match
            + hybrid.w_graph * graph_weight;
        let saturated = (1.0 - (-hybrid.tau * blended).exp()).clamp(0.0, 1.0);
        let hybrid_score = saturated * resonance;

        scored.push((
            hybrid_score,
            QueryHit {
                id: memory.id,
                tenant: memory.tenant.clone(),
                sector: memory.primary_sector.clone(),
                score: hybrid_score,
                content: plaintext,
            },
        ));
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    let results: Vec<QueryHit> = scored.into_iter().map(|(_, hit)| hit).collect();

    let result_ids: Vec<String> = results.iter().map(|h| h.id.to_string()).collect();
    for (a, b) in graph::unordered_pairs(&result_ids, COACTIVATION_PAIRS_PER_SEED) {
        coactivation.push(filters.tenant.clone(), a, b).await;
    }

    if let Some(hook) = hook {
        for hit in &results {
            if let Err(e) = hook.on_query_hit(hit.id, &hit.sector, filters.tenant.as_deref()).await {
                tracing::warn!(error = %e, id = %hit.id, "onQueryHit hook failed");
            }
        }
    }

    cache.set(key, results.clone());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::embed::fake::{FailingEmbedder, FakeEmbedder};
    use crate::persistence::sqlite::SqliteStore;
    use crate::write_path::{add_memory, AddMemoryInput};
    use crate::events::EventBus;

    struct PassthroughEncryptor;

    #[async_trait::async_trait]
    impl Encryptor for PassthroughEncryptor {
        async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            Ok(plaintext.to_vec())
        }
        async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
            Ok(ciphertext.to_vec())
        }
    }

    async fn seeded_store() -> (SqliteStore, PassthroughEncryptor, FakeEmbedder, EngineConfig, EventBus) {
        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let embedder = FakeEmbedder::new(32);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);
        add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"the quick brown fox jumps over the lazy dog".to_vec()).with_tenant("u1"),
            1_000,
        )
        .await
        .unwrap();
        add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"I feel grateful and happy about my progress".to_vec()).with_tenant("u1"),
            1_000,
        )
        .await
        .unwrap();
        (store, encryptor, embedder, config, events)
    }

    #[tokio::test]
    async fn query_result_length_never_exceeds_k() {
        let (store, encryptor, embedder, config, _events) = seeded_store().await;
        let cache = TtlLru::new(100, 60_000);
        let coactivation = CoactivationBuffer::new(500);
        let results = hsg_query(
            &store,
            &encryptor,
            &embedder,
            &config,
            &cache,
            &coactivation,
            None,
            "fox",
            1,
            QueryFilters {
                tenant: Some("u1".to_string()),
                ..Default::default()
            },
            2_000,
        )
        .await
        .unwrap();
        assert!(results.len() <= 1);
    }

    #[tokio::test]
    async fn cache_hit_returns_without_recomputation() {
        let (store, encryptor, embedder, config, _events) = seeded_store().await;
        let cache = TtlLru::new(100, 60_000);
        let coactivation = CoactivationBuffer::new(500);
        let filters = QueryFilters {
            tenant: Some("u1".to_string()),
            ..Default::default()
        };
        let first = hsg_query(&store, &encryptor, &embedder, &config, &cache, &coactivation, None, "fox", 5, filters.clone(), 2_000)
            .await
            .unwrap();
        let second = hsg_query(&store, &encryptor, &embedder, &config, &cache, &coactivation, None, "fox", 5, filters, 9_000)
            .await
            .unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn embedder_failure_falls_back_to_lexical_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let working_embedder = FakeEmbedder::new(32);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);
        add_memory(
            &store,
            &encryptor,
            &working_embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"a distinctive lexical marker phrase".to_vec()).with_tenant("u9"),
            1_000,
        )
        .await
        .unwrap();

        let failing_embedder = FailingEmbedder;
        let cache = TtlLru::new(100, 60_000);
        let coactivation = CoactivationBuffer::new(500);
        let results = hsg_query(
            &store,
            &encryptor,
            &failing_embedder,
            &config,
            &cache,
            &coactivation,
            None,
            "distinctive marker",
            5,
            QueryFilters {
                tenant: Some("u9".to_string()),
                ..Default::default()
            },
            2_000,
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0.5);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a: HashSet<String> = ["a".to_string()].into_iter().collect();
        let b: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(jaccard(&a, &b), 0.0);
    }
}
