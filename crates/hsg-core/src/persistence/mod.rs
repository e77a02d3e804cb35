//! The persistence contract: row store, vector store, and the atomic
//! transaction primitive the write/maintenance paths depend on. The crate
//! ships one concrete adapter, [`sqlite::SqliteStore`]; other backends
//! implement the same traits.

pub mod export;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Sector;
use crate::errors::Result;
use crate::models::{Memory, VectorRecord, Waypoint};

/// Row store + waypoint operations.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get_mem(&self, id: Uuid, tenant: Option<&str>) -> Result<Option<Memory>>;
    async fn get_mem_by_simhash(&self, simhash: u64, tenant: Option<&str>) -> Result<Option<Memory>>;
    async fn get_mems(&self, ids: &[Uuid]) -> Result<Vec<Memory>>;
    /// Lists up to `limit` rows scoped to `tenant`, for the query path's
    /// lexical fallback when the embedder is unavailable. No ordering
    /// guarantee beyond "stable enough for a single scan".
    async fn list_mems_for_tenant(&self, tenant: Option<&str>, limit: usize) -> Result<Vec<Memory>>;
    async fn ins_mem(&self, row: &Memory) -> Result<()>;
    async fn ins_mems(&self, rows: &[Memory]) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    async fn upd_mem(
        &self,
        id: Uuid,
        tenant: Option<&str>,
        content: &[u8],
        sector: &Sector,
        tags: &[String],
        metadata: &serde_json::Value,
        updated_at_ms: i64,
    ) -> Result<()>;
    async fn upd_seen(
        &self,
        id: Uuid,
        tenant: Option<&str>,
        last_seen_at_ms: i64,
        salience: f64,
        updated_at_ms: i64,
    ) -> Result<()>;
    async fn upd_mean_vec(
        &self,
        id: Uuid,
        tenant: Option<&str>,
        dim: usize,
        mean_vector: &[u8],
    ) -> Result<()>;
    /// Cascade-delete: also removes the memory's vectors and any waypoint
    /// touching it.
    async fn del_mem(&self, id: Uuid, tenant: Option<&str>) -> Result<()>;

    async fn get_waypoint(&self, src: &str, dst: &str, tenant: Option<&str>) -> Result<Option<Waypoint>>;
    async fn get_waypoints_by_src(&self, src: &str, tenant: Option<&str>) -> Result<Vec<Waypoint>>;
    async fn get_waypoints_for_pairs(
        &self,
        pairs: &[(String, String)],
        tenant: Option<&str>,
    ) -> Result<HashMap<(String, String), Waypoint>>;
    /// UPSERT by `(src, dst, tenant)`.
    async fn ins_waypoint(&self, waypoint: &Waypoint) -> Result<()>;
    async fn ins_waypoints(&self, waypoints: &[Waypoint]) -> Result<()>;
    async fn prune_waypoints(&self, threshold: f64, tenant: Option<&str>) -> Result<u64>;
}

/// Per-sector blob vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn store_vector(&self, record: &VectorRecord) -> Result<()>;
    async fn store_vectors(&self, records: &[VectorRecord]) -> Result<()>;
    async fn get_vectors_by_id(&self, memory_id: Uuid, tenant: Option<&str>) -> Result<Vec<VectorRecord>>;
    async fn get_vectors_by_ids(&self, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<Vec<VectorRecord>>;
    async fn delete_vectors(&self, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<()>;
    /// Exact or approximate nearest-neighbor search; returns `(memory_id,
    /// score)` pairs, highest score first, truncated to `top_k`.
    async fn search_similar(
        &self,
        sector: &Sector,
        vector: &[f32],
        top_k: usize,
        tenant: Option<&str>,
    ) -> Result<Vec<(Uuid, f32)>>;
}

/// Synchronous write surface available inside an atomic transaction. All
/// work here is plain row/vector/waypoint persistence — nothing
/// awaitable belongs inside a transaction; embedding and encryption
/// happen before `Transactional::run` is called.
pub trait TxWriter {
    fn insert_memory(&mut self, memory: &Memory) -> Result<()>;
    fn insert_memories(&mut self, memories: &[Memory]) -> Result<()>;
    fn insert_vector(&mut self, vector: &VectorRecord) -> Result<()>;
    fn insert_vectors(&mut self, vectors: &[VectorRecord]) -> Result<()>;
    fn delete_vectors(&mut self, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<()>;
    fn insert_waypoint(&mut self, waypoint: &Waypoint) -> Result<()>;
    fn insert_waypoints(&mut self, waypoints: &[Waypoint]) -> Result<()>;
    fn update_memory_content(
        &mut self,
        id: Uuid,
        tenant: Option<&str>,
        content: &[u8],
        sector: &Sector,
        tags: &[String],
        metadata: &serde_json::Value,
        updated_at_ms: i64,
    ) -> Result<()>;
    fn update_mean_vector(&mut self, id: Uuid, tenant: Option<&str>, dim: usize, mean_vector: &[u8]) -> Result<()>;
    fn get_waypoint(&mut self, src: &str, dst: &str, tenant: Option<&str>) -> Result<Option<Waypoint>>;
}

/// Atomic execution of a closure against the store's underlying
/// transaction primitive: either every write inside `f` commits, or none
/// do.
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn TxWriter) -> Result<T> + Send + 'static,
        T: Send + 'static;
}
