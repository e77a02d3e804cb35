//! SQLite-backed [`PersistenceStore`], [`VectorStore`], and
//! [`Transactional`] implementation: one database file, a dedicated
//! writer connection, and a reader connection for concurrent reads under
//! WAL.

mod memory_ops;
mod schema;
mod vector_ops;
mod waypoint_ops;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use uuid::Uuid;

use super::{PersistenceStore, Transactional, TxWriter, VectorStore};
use crate::config::Sector;
use crate::errors::{HsgError, Result};
use crate::models::{Memory, VectorRecord, Waypoint};

pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at the OS-appropriate default data directory
    /// (XDG data dir on Linux, `Application Support` on macOS, `%APPDATA%`
    /// on Windows), creating the directory and restricting it to
    /// owner-only on Unix if it doesn't already exist.
    pub fn open_default() -> Result<Self> {
        Self::open(default_db_path()?)
    }

    /// Open (creating if absent) the database at `path`, applying the
    /// schema and tightening file permissions to owner-only on Unix.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();

        let writer_conn = Connection::open(&path)
            .map_err(|e| HsgError::Persistence(format!("failed to open {path:?}: {e}")))?;
        schema::configure_connection(&writer_conn)?;
        schema::apply_schema(&writer_conn)?;
        schema::harden_permissions(&path);

        let reader_conn = Connection::open(&path)
            .map_err(|e| HsgError::Persistence(format!("failed to open {path:?}: {e}")))?;
        schema::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    /// An in-memory store for tests. A plain `Connection::open_in_memory()`
    /// gives each connection its own private database, which would make
    /// the reader blind to the writer's data — so both connections open
    /// the same URI under SQLite's shared-cache mode instead, with a
    /// process-unique name so parallel tests don't see each other's rows.
    pub fn open_in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:hsg_core_mem_{id}?mode=memory&cache=shared");

        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_URI
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer_conn = Connection::open_with_flags(&uri, flags)
            .map_err(|e| HsgError::Persistence(format!("failed to open in-memory db: {e}")))?;
        schema::configure_connection(&writer_conn)?;
        schema::apply_schema(&writer_conn)?;

        let reader_conn = Connection::open_with_flags(&uri, flags)
            .map_err(|e| HsgError::Persistence(format!("failed to open in-memory db: {e}")))?;
        schema::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| HsgError::Persistence("writer connection lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| HsgError::Persistence("reader connection lock poisoned".into()))
    }
}

/// Resolves the OS-appropriate default database path, creating the
/// containing data directory (owner-only on Unix) if it doesn't exist.
fn default_db_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("dev", "openmemory", "hsg")
        .ok_or_else(|| HsgError::Persistence("could not determine project directories".into()))?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .map_err(|e| HsgError::Persistence(format!("failed to create data dir {data_dir:?}: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        let _ = std::fs::set_permissions(data_dir, perms);
    }

    Ok(data_dir.join("hsg.db"))
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn get_mem(&self, id: Uuid, tenant: Option<&str>) -> Result<Option<Memory>> {
        memory_ops::get_mem(&self.reader()?, id, tenant)
    }

    async fn get_mem_by_simhash(&self, simhash: u64, tenant: Option<&str>) -> Result<Option<Memory>> {
        memory_ops::get_mem_by_simhash(&self.reader()?, simhash, tenant)
    }

    async fn get_mems(&self, ids: &[Uuid]) -> Result<Vec<Memory>> {
        memory_ops::get_mems(&self.reader()?, ids)
    }

    async fn list_mems_for_tenant(&self, tenant: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        memory_ops::list_mems_for_tenant(&self.reader()?, tenant, limit)
    }

    async fn ins_mem(&self, row: &Memory) -> Result<()> {
        memory_ops::ins_mem(&self.writer()?, row)
    }

    async fn ins_mems(&self, rows: &[Memory]) -> Result<()> {
        memory_ops::ins_mems(&self.writer()?, rows)
    }

    async fn upd_mem(
        &self,
        id: Uuid,
        tenant: Option<&str>,
        content: &[u8],
        sector: &Sector,
        tags: &[String],
        metadata: &serde_json::Value,
        updated_at_ms: i64,
    ) -> Result<()> {
        memory_ops::upd_mem(&self.writer()?, id, tenant, content, sector, tags, metadata, updated_at_ms)
    }

    async fn upd_seen(
        &self,
        id: Uuid,
        tenant: Option<&str>,
        last_seen_at_ms: i64,
        salience: f64,
        updated_at_ms: i64,
    ) -> Result<()> {
        memory_ops::upd_seen(&self.writer()?, id, tenant, last_seen_at_ms, salience, updated_at_ms)
    }

    async fn upd_mean_vec(&self, id: Uuid, tenant: Option<&str>, dim: usize, mean_vector: &[u8]) -> Result<()> {
        memory_ops::upd_mean_vec(&self.writer()?, id, tenant, dim, mean_vector)
    }

    async fn del_mem(&self, id: Uuid, tenant: Option<&str>) -> Result<()> {
        memory_ops::del_mem(&self.writer()?, id, tenant)
    }

    async fn get_waypoint(&self, src: &str, dst: &str, tenant: Option<&str>) -> Result<Option<Waypoint>> {
        waypoint_ops::get_waypoint(&self.reader()?, src, dst, tenant)
    }

    async fn get_waypoints_by_src(&self, src: &str, tenant: Option<&str>) -> Result<Vec<Waypoint>> {
        waypoint_ops::get_waypoints_by_src(&self.reader()?, src, tenant)
    }

    async fn get_waypoints_for_pairs(
        &self,
        pairs: &[(String, String)],
        tenant: Option<&str>,
    ) -> Result<HashMap<(String, String), Waypoint>> {
        waypoint_ops::get_waypoints_for_pairs(&self.reader()?, pairs, tenant)
    }

    async fn ins_waypoint(&self, waypoint: &Waypoint) -> Result<()> {
        waypoint_ops::ins_waypoint(&self.writer()?, waypoint)
    }

    async fn ins_waypoints(&self, waypoints: &[Waypoint]) -> Result<()> {
        waypoint_ops::ins_waypoints(&self.writer()?, waypoints)
    }

    async fn prune_waypoints(&self, threshold: f64, tenant: Option<&str>) -> Result<u64> {
        waypoint_ops::prune_waypoints(&self.writer()?, threshold, tenant)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn store_vector(&self, record: &VectorRecord) -> Result<()> {
        vector_ops::store_vector(&self.writer()?, record)
    }

    async fn store_vectors(&self, records: &[VectorRecord]) -> Result<()> {
        vector_ops::store_vectors(&self.writer()?, records)
    }

    async fn get_vectors_by_id(&self, memory_id: Uuid, tenant: Option<&str>) -> Result<Vec<VectorRecord>> {
        vector_ops::get_vectors_by_id(&self.reader()?, memory_id, tenant)
    }

    async fn get_vectors_by_ids(&self, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<Vec<VectorRecord>> {
        vector_ops::get_vectors_by_ids(&self.reader()?, memory_ids, tenant)
    }

    async fn delete_vectors(&self, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<()> {
        vector_ops::delete_vectors(&self.writer()?, memory_ids, tenant)
    }

    async fn search_similar(
        &self,
        sector: &Sector,
        vector: &[f32],
        top_k: usize,
        tenant: Option<&str>,
    ) -> Result<Vec<(Uuid, f32)>> {
        vector_ops::search_similar(&self.reader()?, sector, vector, top_k, tenant)
    }
}

struct SqliteTxWriter<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl TxWriter for SqliteTxWriter<'_> {
    fn insert_memory(&mut self, memory: &Memory) -> Result<()> {
        memory_ops::ins_mem(self.tx, memory)
    }

    fn insert_memories(&mut self, memories: &[Memory]) -> Result<()> {
        memory_ops::ins_mems(self.tx, memories)
    }

    fn insert_vector(&mut self, vector: &VectorRecord) -> Result<()> {
        vector_ops::store_vector(self.tx, vector)
    }

    fn insert_vectors(&mut self, vectors: &[VectorRecord]) -> Result<()> {
        vector_ops::store_vectors(self.tx, vectors)
    }

    fn delete_vectors(&mut self, memory_ids: &[Uuid], tenant: Option<&str>) -> Result<()> {
        vector_ops::delete_vectors(self.tx, memory_ids, tenant)
    }

    fn insert_waypoint(&mut self, waypoint: &Waypoint) -> Result<()> {
        waypoint_ops::ins_waypoint(self.tx, waypoint)
    }

    fn insert_waypoints(&mut self, waypoints: &[Waypoint]) -> Result<()> {
        waypoint_ops::ins_waypoints(self.tx, waypoints)
    }

    fn update_memory_content(
        &mut self,
        id: Uuid,
        tenant: Option<&str>,
        content: &[u8],
        sector: &Sector,
        tags: &[String],
        metadata: &serde_json::Value,
        updated_at_ms: i64,
    ) -> Result<()> {
        memory_ops::upd_mem(self.tx, id, tenant, content, sector, tags, metadata, updated_at_ms)
    }

    fn update_mean_vector(&mut self, id: Uuid, tenant: Option<&str>, dim: usize, mean_vector: &[u8]) -> Result<()> {
        memory_ops::upd_mean_vec(self.tx, id, tenant, dim, mean_vector)
    }

    fn get_waypoint(&mut self, src: &str, dst: &str, tenant: Option<&str>) -> Result<Option<Waypoint>> {
        waypoint_ops::get_waypoint(self.tx, src, dst, tenant)
    }
}

#[async_trait]
impl Transactional for SqliteStore {
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn TxWriter) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.writer()?;
        let tx = conn
            .transaction()
            .map_err(|e| HsgError::Persistence(format!("begin transaction failed: {e}")))?;
        let mut writer = SqliteTxWriter { tx: &tx };
        let result = f(&mut writer);
        match result {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| HsgError::Persistence(format!("commit failed: {e}")))?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_fetch_memory_roundtrips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let memory = Memory::new(
            Uuid::new_v4(),
            Some("tenant-a".into()),
            b"ciphertext".to_vec(),
            Sector::semantic(),
            vec!["tag1".into()],
            serde_json::json!({"k": 1}),
            42,
            1_000,
            0.5,
            0.02,
            4,
            vec![0u8; 16],
        );
        store.ins_mem(&memory).await.unwrap();

        let fetched = store.get_mem(memory.id, Some("tenant-a")).await.unwrap().unwrap();
        assert_eq!(fetched.content, memory.content);
        assert_eq!(fetched.tags, memory.tags);
    }

    #[tokio::test]
    async fn tenant_isolation_on_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let memory = Memory::new(
            Uuid::new_v4(),
            Some("tenant-a".into()),
            b"x".to_vec(),
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            1,
            0,
            0.5,
            0.02,
            1,
            vec![0u8; 4],
        );
        store.ins_mem(&memory).await.unwrap();
        assert!(store.get_mem(memory.id, Some("tenant-b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let memory = Memory::new(
            Uuid::new_v4(),
            None,
            b"x".to_vec(),
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            7,
            0,
            0.5,
            0.02,
            1,
            vec![0u8; 4],
        );
        let memory_id = memory.id;
        let result: Result<()> = store
            .run(move |tx| {
                tx.insert_memory(&memory)?;
                Err(HsgError::Internal("simulated failure".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.get_mem(memory_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_waypoints_removes_below_threshold() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .ins_waypoint(&Waypoint::new("a".into(), "b".into(), None, 0.05, 0))
            .await
            .unwrap();
        store
            .ins_waypoint(&Waypoint::new("a".into(), "c".into(), None, 0.9, 0))
            .await
            .unwrap();
        let pruned = store.prune_waypoints(0.1, None).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get_waypoint("a", "b", None).await.unwrap().is_none());
        assert!(store.get_waypoint("a", "c", None).await.unwrap().is_some());
    }

    /// Regression test: re-inserting an untenanted (`tenant = None`) edge
    /// must update the existing row in place, not append a duplicate —
    /// SQLite treats `NULL` as distinct from `NULL` in a unique index, so
    /// the upsert's conflict target has to be built over
    /// `COALESCE(tenant, '')` rather than the raw nullable column.
    #[tokio::test]
    async fn reinserting_untenanted_waypoint_upserts_in_place() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .ins_waypoint(&Waypoint::new("a".into(), "b".into(), None, 0.2, 0))
            .await
            .unwrap();
        store
            .ins_waypoint(&Waypoint::new("a".into(), "b".into(), None, 0.7, 10))
            .await
            .unwrap();

        let edges = store.get_waypoints_by_src("a", None).await.unwrap();
        assert_eq!(edges.len(), 1, "expected one upserted edge, found {edges:?}");
        assert_eq!(edges[0].weight, 0.7);
        assert_eq!(edges[0].updated_at_ms, 10);
    }

    /// The same `NULL`-is-distinct quirk applies to `idx_memories_simhash_
    /// tenant`; a second untenanted row with a colliding simhash must now
    /// be rejected by the unique index rather than silently accepted.
    #[tokio::test]
    async fn duplicate_simhash_is_rejected_for_untenanted_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = Memory::new(
            Uuid::new_v4(),
            None,
            b"x".to_vec(),
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            99,
            0,
            0.5,
            0.02,
            1,
            vec![0u8; 4],
        );
        let second = Memory::new(
            Uuid::new_v4(),
            None,
            b"y".to_vec(),
            Sector::semantic(),
            vec![],
            serde_json::json!({}),
            99,
            0,
            0.5,
            0.02,
            1,
            vec![0u8; 4],
        );
        store.ins_mem(&first).await.unwrap();
        assert!(store.ins_mem(&second).await.is_err());
    }
}
