//! `HsgEngine`: the single owner of an engine instance's caches,
//! co-activation buffer, event bus, and maintenance task. Replaces the
//! process-wide singletons an earlier design leaned on — every caller
//! constructs and holds its own engine.

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::TtlLru;
use crate::classify::learned::{ClassifierModel, TrainingSample};
use crate::config::EngineConfig;
use crate::consolidation::coactivation::CoactivationBuffer;
use crate::crypto::Encryptor;
use crate::embed::EmbeddingProvider;
use crate::errors::Result;
use crate::events::EventBus;
use crate::models::Memory;
use crate::persistence::{PersistenceStore, Transactional, VectorStore};
use crate::query_path::{self, QueryFilters, QueryHit, QueryHitHook};
use crate::scheduler::{self, MaintenanceScope};
use crate::write_path::{self, classifier_cache_key, AddMemoryInput};

/// Bundles a concrete store with the encryption/embedding providers and
/// config an engine instance needs for every operation. Kept as a trait
/// rather than a generic struct field so `HsgEngine` stays a single
/// concrete type regardless of which store/embedder/encryptor a caller
/// plugs in.
pub trait EngineStore: PersistenceStore + VectorStore + Transactional {}
impl<T: PersistenceStore + VectorStore + Transactional> EngineStore for T {}

/// Owns everything one running instance of the engine needs: the store,
/// ambient providers, the query-result cache, the co-activation buffer,
/// the event bus, and (outside tests) a background maintenance task.
pub struct HsgEngine<S: EngineStore + 'static> {
    store: Arc<S>,
    encryptor: Arc<dyn Encryptor>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: Arc<EngineConfig>,
    cache: TtlLru<String, Vec<QueryHit>>,
    classifier_models: TtlLru<String, ClassifierModel>,
    coactivation: Arc<CoactivationBuffer>,
    events: Arc<EventBus>,
    maintenance: Option<tokio::task::JoinHandle<()>>,
}

impl<S: EngineStore + 'static> HsgEngine<S> {
    /// Builds an engine instance. Does not start the maintenance task —
    /// call [`HsgEngine::start`] once construction and any initial seeding
    /// is done.
    pub fn new(
        store: S,
        encryptor: Arc<dyn Encryptor>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let cache = TtlLru::new(config.hsg_cache_capacity, config.hsg_cache_ttl_ms);
        let classifier_models = TtlLru::new(config.classifier_cache_capacity, config.hsg_cache_ttl_ms);
        let coactivation = Arc::new(CoactivationBuffer::new(config.coactivation_capacity));
        let events = Arc::new(EventBus::default());
        Self {
            store: Arc::new(store),
            encryptor,
            embedder,
            config,
            cache,
            classifier_models,
            coactivation,
            events,
            maintenance: None,
        }
    }

    /// Trains (or retrains) the learned classifier for `tenant` on
    /// `samples` and stores it in the engine's classifier cache, where
    /// subsequent `add_memory`/`add_memories` calls will consult it.
    pub async fn train_classifier(&self, tenant: Option<&str>, samples: &[TrainingSample], dim: usize, now_ms: i64) {
        let key = classifier_cache_key(tenant);
        let mut model = self
            .classifier_models
            .get(&key)
            .unwrap_or_else(|| ClassifierModel::new(tenant.map(str::to_string), dim, now_ms));
        if model.dim != dim {
            model.reset(dim, now_ms);
        }
        model.train(samples, 50, 0.1, || async {}).await;
        self.classifier_models.set(key, model);
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts the background maintenance task scoped to `scope`. A no-op
    /// (and returns `false`) if one is already running or `is_test` is
    /// set.
    pub fn start(&mut self, scope: MaintenanceScope) -> bool {
        if self.maintenance.is_some() {
            return false;
        }
        let store: Arc<dyn PersistenceStore> = self.store.clone();
        self.maintenance = scheduler::spawn(store, self.config.clone(), self.coactivation.clone(), self.events.clone(), scope);
        self.maintenance.is_some()
    }

    /// Stops the maintenance task, if running. Idempotent.
    pub fn close(&mut self) {
        if let Some(handle) = self.maintenance.take() {
            handle.abort();
        }
    }

    pub async fn add_memory(&self, input: AddMemoryInput, now_ms: i64) -> Result<Memory> {
        write_path::add_memory(
            self.store.as_ref(),
            self.encryptor.as_ref(),
            self.embedder.as_ref(),
            &self.config,
            Some(&self.classifier_models),
            &self.events,
            input,
            now_ms,
        )
        .await
    }

    pub async fn add_memories(&self, inputs: Vec<AddMemoryInput>, now_ms: i64) -> Result<Vec<Memory>> {
        write_path::add_memories(
            self.store.as_ref(),
            self.encryptor.as_ref(),
            self.embedder.as_ref(),
            &self.config,
            Some(&self.classifier_models),
            &self.events,
            inputs,
            now_ms,
        )
        .await
    }

    pub async fn query(
        &self,
        query: &str,
        k: usize,
        filters: QueryFilters,
        hook: Option<&dyn QueryHitHook>,
        now_ms: i64,
    ) -> Result<Vec<QueryHit>> {
        query_path::hsg_query(
            self.store.as_ref(),
            self.encryptor.as_ref(),
            self.embedder.as_ref(),
            &self.config,
            &self.cache,
            &self.coactivation,
            hook,
            query,
            k,
            filters,
            now_ms,
        )
        .await
    }

    pub async fn reinforce_memory(&self, id: Uuid, tenant: Option<&str>, boost: f64, now_ms: i64) -> Result<()> {
        crate::consolidation::reinforce_memory(self.store.as_ref(), id, tenant, boost, now_ms).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_memory(
        &self,
        id: Uuid,
        tenant: Option<&str>,
        new_content: Option<&[u8]>,
        tags: Vec<String>,
        metadata: serde_json::Value,
        now_ms: i64,
    ) -> Result<()> {
        crate::consolidation::update_memory(
            self.store.as_ref(),
            self.encryptor.as_ref(),
            self.embedder.as_ref(),
            id,
            tenant,
            new_content,
            tags,
            metadata,
            now_ms,
        )
        .await
    }

    pub async fn delete_memory(&self, id: Uuid, tenant: Option<&str>) -> Result<()> {
        self.store.del_mem(id, tenant).await
    }

    /// Invalidates the entire query-result cache. Callers that bypass the
    /// engine's own mutation methods (e.g. bulk imports against the store
    /// directly) should call this afterward.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }
}

impl<S: EngineStore + 'static> Drop for HsgEngine<S> {
    fn drop(&mut self) {
        self.close();
    }
}
