//! # HSG Core
//!
//! Hierarchical Storage Graph: a per-tenant, content-addressed memory
//! engine. Content is classified into sectors, embedded per sector, and
//! linked into a weighted directed graph of "waypoints". Queries blend
//! vector similarity, lexical overlap, graph spreading-activation, and
//! time-decayed salience into one ranked result set.
//!
//! ## Layout
//!
//! - [`config`] — engine configuration and the sector table.
//! - [`models`] — the memory row, its per-sector vectors, and waypoints.
//! - [`errors`] — the crate-wide [`errors::HsgError`].
//! - [`persistence`] — the store contracts ([`persistence::PersistenceStore`],
//!   [`persistence::VectorStore`], [`persistence::Transactional`]) and the
//!   bundled [`persistence::sqlite::SqliteStore`] adapter.
//! - [`crypto`] / [`embed`] — the encryption and embedding provider
//!   contracts, plus reference implementations.
//! - [`classify`] — rule-based sector classification, refined by a
//!   per-tenant learned classifier.
//! - [`graph`] — waypoint reinforcement, spreading activation, pruning.
//! - [`consolidation`] — decay sweeps, co-activation (Hebbian) flushing,
//!   and the `reinforceMemory`/`updateMemory` mutation hooks.
//! - [`write_path`] / [`query_path`] — the two operations callers drive
//!   directly: `add_memory`/`add_memories` and `hsg_query`.
//! - [`scheduler`] — the periodic maintenance tick, foreground or
//!   background.
//! - [`engine`] — [`engine::HsgEngine`], the single-owner façade bundling
//!   a store with its providers, cache, and background task.
//! - [`events`] — the in-process [`events::EventBus`] subscribers can
//!   observe writes and maintenance activity on.
//! - [`retry`] — exponential backoff for retryable store/embedder errors.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use hsg_core::{EngineConfig, HsgEngine, AddMemoryInput, QueryFilters};
//! use hsg_core::persistence::sqlite::SqliteStore;
//! use hsg_core::crypto::AesGcmEncryptor;
//! use std::sync::Arc;
//!
//! # async fn run() -> hsg_core::Result<()> {
//! let store = SqliteStore::open_in_memory()?;
//! let encryptor = Arc::new(AesGcmEncryptor::new(&[0u8; 32])?);
//! let embedder = Arc::new(hsg_core::embed::fake::FakeEmbedder::new(768));
//! let engine = HsgEngine::new(store, encryptor, embedder, EngineConfig::default());
//!
//! let memory = engine
//!     .add_memory(AddMemoryInput::new(b"paris trip planning".to_vec()).with_tenant("u1"), 0)
//!     .await?;
//!
//! let hits = engine
//!     .query("paris trip", 5, QueryFilters::default(), None, 0)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod consolidation;
pub mod crypto;
pub mod dedup;
pub mod embed;
pub mod engine;
pub mod errors;
pub mod events;
pub mod graph;
pub mod models;
pub mod persistence;
pub mod query_path;
pub mod retry;
pub mod scheduler;
pub mod vecmath;
pub mod write_path;

pub use config::{EngineConfig, Sector, SectorConfig, SectorTable};
pub use engine::{EngineStore, HsgEngine};
pub use errors::{HsgError, Result};
pub use events::{EventBus, HsgEvent, MaintenanceOp};
pub use models::{Memory, VectorRecord, Waypoint};
pub use query_path::{hsg_query, QueryFilters, QueryHit, QueryHitHook};
pub use scheduler::MaintenanceScope;
pub use write_path::{add_memories, add_memory, AddMemoryInput};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        AddMemoryInput, EngineConfig, EventBus, HsgEngine, HsgError, HsgEvent, Memory,
        QueryFilters, QueryHit, Result, Sector,
    };
    pub use crate::persistence::{PersistenceStore, Transactional, VectorStore};
    pub use crate::crypto::Encryptor;
    pub use crate::embed::EmbeddingProvider;

    #[cfg(any(test, feature = "test-support"))]
    pub use crate::embed::fake::FakeEmbedder;
}
