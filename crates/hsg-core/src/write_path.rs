//! `add_memory` / `add_memories`: classify, dedup, embed, encrypt, and
//! persist atomically, wiring the new row into the graph.

use uuid::Uuid;

use crate::cache::TtlLru;
use crate::classify::{learned::ClassifierModel, refine_with_learned, rule_based};
use crate::config::{EngineConfig, Sector};
use crate::crypto::Encryptor;
use crate::dedup;
use crate::embed::EmbeddingProvider;
use crate::errors::Result;
use crate::events::{EventBus, HsgEvent};
use crate::models::{memory::clamp_unit, waypoint::virtual_node, Memory, VectorRecord, Waypoint};
use crate::persistence::{PersistenceStore, Transactional, TxWriter, VectorStore};
use crate::vecmath;

/// Cache key for the untenanted (`None`) classifier model.
const UNTENANTED_MODEL_KEY: &str = "\0untenanted";

pub(crate) fn classifier_cache_key(tenant: Option<&str>) -> String {
    tenant.unwrap_or(UNTENANTED_MODEL_KEY).to_string()
}

/// Neighbor score floor for intra-sector similarity linking.
const INTRA_SECTOR_THRESHOLD: f32 = 0.85;
/// Max neighbors considered for intra-sector similarity linking.
const INTRA_SECTOR_NEIGHBORS: usize = 50;
/// Batch chunk size for `add_memories`, bounding embedding memory use.
const BATCH_CHUNK_SIZE: usize = 20;

/// Caller-supplied input for one `add_memory` call.
#[derive(Debug, Clone)]
pub struct AddMemoryInput {
    pub tenant: Option<String>,
    pub content: Vec<u8>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub override_id: Option<Uuid>,
    pub override_decay_lambda: Option<f64>,
}

impl AddMemoryInput {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            tenant: None,
            content,
            tags: Vec::new(),
            metadata: serde_json::Value::Null,
            override_id: None,
            override_decay_lambda: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// A freshly classified/embedded/encrypted row, plus the graph edges it
/// should create, not yet persisted.
struct PreparedNew {
    memory: Memory,
    records: Vec<VectorRecord>,
    waypoints: Vec<Waypoint>,
}

enum Prepared {
    Existing(Memory),
    New(PreparedNew),
}

#[allow(clippy::too_many_arguments)]
async fn prepare_one(
    store: &(impl PersistenceStore + VectorStore),
    encryptor: &dyn Encryptor,
    embedder: &dyn EmbeddingProvider,
    config: &EngineConfig,
    classifier_models: Option<&TtlLru<String, ClassifierModel>>,
    input: &AddMemoryInput,
    now_ms: i64,
) -> Result<Prepared> {
    let text = String::from_utf8_lossy(&input.content).into_owned();
    let mut classification = rule_based::classify(&text);
    let simhash = dedup::simhash(&text);

    if classification.is_default_semantic() {
        if let Some(models) = classifier_models {
            if let Some(model) = models.get(&classifier_cache_key(input.tenant.as_deref())) {
                if let Ok(semantic_vec) = embedder.embed_for_sector(&text, &Sector::semantic()).await {
                    let learned = model.predict(&semantic_vec);
                    classification = refine_with_learned(classification, learned, config.classifier_override_threshold);
                }
            }
        }
    }

    if input.override_id.is_none() {
        if let Some(existing) = store.get_mem_by_simhash(simhash, input.tenant.as_deref()).await? {
            let decrypted = encryptor.decrypt(&existing.content).await.unwrap_or_default();
            if decrypted == input.content {
                let mut updated = existing;
                updated.touch_seen(now_ms, 0.1);
                store
                    .upd_seen(updated.id, input.tenant.as_deref(), updated.last_seen_at_ms, updated.salience, now_ms)
                    .await?;
                return Ok(Prepared::Existing(updated));
            }
            tracing::warn!(simhash, "simhash collision with divergent content; proceeding as new");
        }
    }

    let id = input.override_id.unwrap_or_else(Uuid::new_v4);

    let mut sectors = vec![Sector::semantic(), classification.primary.clone()];
    sectors.extend(classification.additional.iter().cloned());
    sectors.dedup();

    let sector_vecs = embedder
        .embed_multi_sector(&id.to_string(), &text, &sectors, input.tenant.as_deref())
        .await?;
    let mean = vecmath::mean(&sector_vecs.iter().map(|s| s.vector.clone()).collect::<Vec<_>>());
    let mean_bytes = vecmath::to_bytes(&mean);

    let encrypted = encryptor.encrypt(&input.content).await?;
    let salience = clamp_unit(0.4 + 0.1 * classification.additional.len() as f64);
    let decay_lambda = input
        .override_decay_lambda
        .unwrap_or_else(|| config.sectors.get(&classification.primary).decay_lambda);

    let memory = Memory::new(
        id,
        input.tenant.clone(),
        encrypted,
        classification.primary.clone(),
        input.tags.clone(),
        input.metadata.clone(),
        simhash,
        now_ms,
        salience,
        decay_lambda,
        mean.len(),
        mean_bytes,
    );

    let records: Vec<VectorRecord> = sector_vecs
        .iter()
        .map(|sv| VectorRecord::new(id, sv.sector.clone(), vecmath::to_bytes(&sv.vector), sv.dim).with_tenant(input.tenant.clone()))
        .collect();

    let mut waypoints = Vec::new();
    let id_str = id.to_string();

    for s in &classification.additional {
        let node = virtual_node(&id_str, s.as_str());
        waypoints.push(Waypoint::new(id_str.clone(), node.clone(), input.tenant.clone(), 0.5, now_ms));
        waypoints.push(Waypoint::new(node, id_str.clone(), input.tenant.clone(), 0.5, now_ms));
    }

    if let Some(semantic_vec) = sector_vecs.iter().find(|sv| sv.sector == Sector::semantic()) {
        let hits = store
            .search_similar(&Sector::semantic(), &semantic_vec.vector, 1, input.tenant.as_deref())
            .await?;
        match hits.into_iter().find(|(hit_id, _)| *hit_id != id) {
            Some((best_id, score)) => {
                waypoints.push(Waypoint::new(id_str.clone(), best_id.to_string(), input.tenant.clone(), score as f64, now_ms));
            }
            None => {
                waypoints.push(Waypoint::new(id_str.clone(), id_str.clone(), input.tenant.clone(), 1.0, now_ms));
            }
        }
    }

    if let Some(primary_vec) = sector_vecs.iter().find(|sv| sv.sector == classification.primary) {
        let neighbors = store
            .search_similar(&classification.primary, &primary_vec.vector, INTRA_SECTOR_NEIGHBORS + 1, input.tenant.as_deref())
            .await?;
        for (neighbor_id, score) in neighbors {
            if neighbor_id == id || score < INTRA_SECTOR_THRESHOLD {
                continue;
            }
            let neighbor_str = neighbor_id.to_string();
            waypoints.push(Waypoint::new(id_str.clone(), neighbor_str.clone(), input.tenant.clone(), 0.5, now_ms));
            waypoints.push(Waypoint::new(neighbor_str, id_str.clone(), input.tenant.clone(), 0.5, now_ms));
        }
    }

    Ok(Prepared::New(PreparedNew { memory, records, waypoints }))
}

/// Classify, dedup, embed, encrypt, and persist one memory. Returns the
/// existing row unchanged (salience bumped) if `(simhash, tenant)`
/// already exists with identical decrypted content.
pub async fn add_memory(
    store: &(impl PersistenceStore + VectorStore + Transactional + 'static),
    encryptor: &dyn Encryptor,
    embedder: &dyn EmbeddingProvider,
    config: &EngineConfig,
    classifier_models: Option<&TtlLru<String, ClassifierModel>>,
    events: &EventBus,
    input: AddMemoryInput,
    now_ms: i64,
) -> Result<Memory> {
    match prepare_one(store, encryptor, embedder, config, classifier_models, &input, now_ms).await? {
        Prepared::Existing(memory) => Ok(memory),
        Prepared::New(prepared) => {
            let memory = prepared.memory.clone();
            let records = prepared.records;
            let waypoints = prepared.waypoints;
            store
                .run(move |tx| {
                    tx.insert_memory(&memory)?;
                    tx.insert_vectors(&records)?;
                    tx.insert_waypoints(&waypoints)?;
                    Ok(())
                })
                .await?;
            events.publish(HsgEvent::MemoryAdded {
                id: prepared.memory.id,
                tenant: input.tenant.clone(),
                sector: prepared.memory.primary_sector.clone(),
            });
            Ok(prepared.memory)
        }
    }
}

/// Batched `add_memory`. Embedding is processed in chunks of at most
/// [`BATCH_CHUNK_SIZE`] to bound memory; all new rows, vectors, and
/// waypoints across the whole batch commit in one transaction — any
/// failure rolls back the entire batch.
pub async fn add_memories(
    store: &(impl PersistenceStore + VectorStore + Transactional + 'static),
    encryptor: &dyn Encryptor,
    embedder: &dyn EmbeddingProvider,
    config: &EngineConfig,
    classifier_models: Option<&TtlLru<String, ClassifierModel>>,
    events: &EventBus,
    inputs: Vec<AddMemoryInput>,
    now_ms: i64,
) -> Result<Vec<Memory>> {
    let mut results = Vec::with_capacity(inputs.len());
    let mut new_memories = Vec::new();
    let mut new_records = Vec::new();
    let mut new_waypoints = Vec::new();

    for chunk in inputs.chunks(BATCH_CHUNK_SIZE) {
        for input in chunk {
            match prepare_one(store, encryptor, embedder, config, classifier_models, input, now_ms).await? {
                Prepared::Existing(memory) => results.push(memory),
                Prepared::New(prepared) => {
                    results.push(prepared.memory.clone());
                    new_memories.push(prepared.memory);
                    new_records.extend(prepared.records);
                    new_waypoints.extend(prepared.waypoints);
                }
            }
        }
    }

    if !new_memories.is_empty() {
        let added: Vec<(Uuid, Option<String>, Sector)> = new_memories
            .iter()
            .map(|m| (m.id, m.tenant.clone(), m.primary_sector.clone()))
            .collect();
        store
            .run(move |tx| {
                tx.insert_memories(&new_memories)?;
                tx.insert_vectors(&new_records)?;
                tx.insert_waypoints(&new_waypoints)?;
                Ok(())
            })
            .await?;
        for (id, tenant, sector) in added {
            events.publish(HsgEvent::MemoryAdded { id, tenant, sector });
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::fake::FakeEmbedder;
    use crate::persistence::sqlite::SqliteStore;

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

    #[tokio::test]
    async fn idempotent_add_returns_same_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let embedder = FakeEmbedder::new(16);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);

        let first = add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"Hello World".to_vec()).with_tenant("u1"),
            1_000,
        )
        .await
        .unwrap();

        let second = add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"Hello World".to_vec()).with_tenant("u1"),
            2_000,
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.salience >= first.salience);
        assert_eq!(second.last_seen_at_ms, 2_000);
    }

    #[tokio::test]
    async fn first_memory_gets_self_loop_root_marker() {
        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let embedder = FakeEmbedder::new(16);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);

        let memory = add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"The first memory in this tenant".to_vec()).with_tenant("u2"),
            1_000,
        )
        .await
        .unwrap();

        let id_str = memory.id.to_string();
        let edge = store.get_waypoint(&id_str, &id_str, Some("u2")).await.unwrap();
        assert!(edge.is_some());
        assert_eq!(edge.unwrap().weight, 1.0);
    }

    #[tokio::test]
    async fn tenants_do_not_share_dedup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let embedder = FakeEmbedder::new(16);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);

        let a = add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"shared content".to_vec()).with_tenant("tenant-a"),
            1_000,
        )
        .await
        .unwrap();
        let b = add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            None,
            &events,
            AddMemoryInput::new(b"shared content".to_vec()).with_tenant("tenant-b"),
            1_000,
        )
        .await
        .unwrap();

        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn add_memories_persists_whole_batch() {
        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let embedder = FakeEmbedder::new(16);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);

        let inputs = vec![
            AddMemoryInput::new(b"first distinct memory".to_vec()).with_tenant("u3"),
            AddMemoryInput::new(b"second distinct memory".to_vec()).with_tenant("u3"),
            AddMemoryInput::new(b"third distinct memory".to_vec()).with_tenant("u3"),
        ];
        let results = add_memories(&store, &encryptor, &embedder, &config, None, &events, inputs, 1_000)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        for memory in &results {
            assert!(store.get_mem(memory.id, Some("u3")).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn learned_classifier_overrides_default_semantic_above_threshold() {
        use crate::classify::learned::{ClassifierModel, TrainingSample};
        use crate::config::Sector;

        let store = SqliteStore::open_in_memory().unwrap();
        let encryptor = PassthroughEncryptor;
        let embedder = FakeEmbedder::new(16);
        let config = EngineConfig::for_test();
        let events = EventBus::new(16);

        let text = "numbers and facts about thermodynamics";
        let vector = embedder.embed_for_sector(text, &Sector::semantic()).await.unwrap();
        let mut model = ClassifierModel::new(Some("u4".to_string()), vector.len(), 0);
        let samples = vec![
            TrainingSample { vector: vector.clone(), label: Sector::new("reflective") },
            TrainingSample { vector: vec![0.0; vector.len()], label: Sector::new("semantic") },
        ];
        model.train(&samples, 300, 0.5, || async {}).await;

        let models: TtlLru<String, ClassifierModel> = TtlLru::new(10, 60_000);
        models.set(classifier_cache_key(Some("u4")), model);

        let memory = add_memory(
            &store,
            &encryptor,
            &embedder,
            &config,
            Some(&models),
            &events,
            AddMemoryInput::new(text.as_bytes().to_vec()).with_tenant("u4"),
            1_000,
        )
        .await
        .unwrap();

        assert_eq!(memory.primary_sector, Sector::new("reflective"));
    }
}
