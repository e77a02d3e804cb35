//! End-to-end scenarios exercised against an in-memory `SqliteStore`, a
//! deterministic embedder, and real AES-GCM encryption.

use std::sync::Arc;

use hsg_core::cache::TtlLru;
use hsg_core::config::EngineConfig;
use hsg_core::consolidation::coactivation::CoactivationBuffer;
use hsg_core::crypto::AesGcmEncryptor;
use hsg_core::embed::fake::{FailingEmbedder, FakeEmbedder};
use hsg_core::engine::HsgEngine;
use hsg_core::events::EventBus;
use hsg_core::persistence::sqlite::SqliteStore;
use hsg_core::query_path::{hsg_query, QueryFilters};
use hsg_core::write_path::{add_memories, add_memory, AddMemoryInput};
use hsg_core::scheduler::{run_tick, MaintenanceScope};

/// Initializes a test-scoped tracing subscriber so `cargo test -- --nocapture`
/// surfaces engine logs. Safe to call from every test; only the first call
/// actually installs the subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn key() -> [u8; 32] {
    [7u8; 32]
}

fn test_engine() -> HsgEngine<SqliteStore> {
    HsgEngine::new(
        SqliteStore::open_in_memory().unwrap(),
        Arc::new(AesGcmEncryptor::new(&key()).unwrap()),
        Arc::new(FakeEmbedder::new(32)),
        EngineConfig::for_test(),
    )
}

#[tokio::test]
async fn add_then_query_round_trips_through_the_engine() {
    init_tracing();
    let engine = test_engine();
    let memory = engine
        .add_memory(
            AddMemoryInput::new(b"planning the paris trip itinerary".to_vec()).with_tenant("alice"),
            1_000,
        )
        .await
        .unwrap();

    let hits = engine
        .query(
            "paris itinerary",
            5,
            QueryFilters {
                tenant: Some("alice".to_string()),
                ..Default::default()
            },
            None,
            2_000,
        )
        .await
        .unwrap();

    assert!(hits.iter().any(|h| h.id == memory.id));
}

#[tokio::test]
async fn repeated_add_is_idempotent_and_bumps_salience() {
    init_tracing();
    let engine = test_engine();
    let input = || AddMemoryInput::new(b"remember to water the plants".to_vec()).with_tenant("bob");

    let first = engine.add_memory(input(), 1_000).await.unwrap();
    let second = engine.add_memory(input(), 5_000).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.salience >= first.salience);
    assert!(second.last_seen_at_ms > first.last_seen_at_ms);
}

#[tokio::test]
async fn tenants_are_isolated_in_both_write_and_query() {
    init_tracing();
    let engine = test_engine();
    engine
        .add_memory(AddMemoryInput::new(b"shared phrasing, different owners".to_vec()).with_tenant("alice"), 1_000)
        .await
        .unwrap();
    engine
        .add_memory(AddMemoryInput::new(b"shared phrasing, different owners".to_vec()).with_tenant("bob"), 1_000)
        .await
        .unwrap();

    let alice_hits = engine
        .query(
            "shared phrasing",
            10,
            QueryFilters {
                tenant: Some("alice".to_string()),
                ..Default::default()
            },
            None,
            2_000,
        )
        .await
        .unwrap();
    let bob_hits = engine
        .query(
            "shared phrasing",
            10,
            QueryFilters {
                tenant: Some("bob".to_string()),
                ..Default::default()
            },
            None,
            2_000,
        )
        .await
        .unwrap();

    assert!(alice_hits.iter().all(|h| h.tenant.as_deref() == Some("alice")));
    assert!(bob_hits.iter().all(|h| h.tenant.as_deref() == Some("bob")));
}

#[tokio::test]
async fn deleting_a_memory_removes_it_from_later_queries() {
    init_tracing();
    let engine = test_engine();
    let memory = engine
        .add_memory(AddMemoryInput::new(b"a note destined for deletion".to_vec()).with_tenant("carol"), 1_000)
        .await
        .unwrap();

    engine.delete_memory(memory.id, Some("carol")).await.unwrap();

    let hits = engine
        .query(
            "destined for deletion",
            10,
            QueryFilters {
                tenant: Some("carol".to_string()),
                ..Default::default()
            },
            None,
            2_000,
        )
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.id != memory.id));
}

#[tokio::test]
async fn embedder_outage_falls_back_to_lexical_search() {
    init_tracing();
    let store = SqliteStore::open_in_memory().unwrap();
    let encryptor = AesGcmEncryptor::new(&key()).unwrap();
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
        AddMemoryInput::new(b"a rare unmistakable diagnostic token".to_vec()).with_tenant("dana"),
        1_000,
    )
    .await
    .unwrap();

    let failing_embedder = FailingEmbedder;
    let cache = TtlLru::new(100, 60_000);
    let coactivation = CoactivationBuffer::new(500);
    let hits = hsg_query(
        &store,
        &encryptor,
        &failing_embedder,
        &config,
        &cache,
        &coactivation,
        None,
        "unmistakable diagnostic token",
        5,
        QueryFilters {
            tenant: Some("dana".to_string()),
            ..Default::default()
        },
        2_000,
    )
    .await
    .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].score, 0.5);
}

#[tokio::test]
async fn batch_add_persists_every_input() {
    init_tracing();
    let store = SqliteStore::open_in_memory().unwrap();
    let encryptor = AesGcmEncryptor::new(&key()).unwrap();
    let embedder = FakeEmbedder::new(32);
    let config = EngineConfig::for_test();
    let events = EventBus::new(16);

    let inputs: Vec<_> = (0..25)
        .map(|i| AddMemoryInput::new(format!("batch entry number {i}").into_bytes()).with_tenant("erin"))
        .collect();

    let memories = add_memories(&store, &encryptor, &embedder, &config, None, &events, inputs, 1_000)
        .await
        .unwrap();
    assert_eq!(memories.len(), 25);

    let hits = hsg_query(
        &store,
        &encryptor,
        &embedder,
        &config,
        &TtlLru::new(100, 60_000),
        &CoactivationBuffer::new(500),
        None,
        "batch entry",
        25,
        QueryFilters {
            tenant: Some("erin".to_string()),
            ..Default::default()
        },
        2_000,
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 25);
}

#[tokio::test]
async fn maintenance_tick_decays_salience_and_prunes_weak_waypoints() {
    init_tracing();
    let store = SqliteStore::open_in_memory().unwrap();
    let encryptor = AesGcmEncryptor::new(&key()).unwrap();
    let embedder = FakeEmbedder::new(32);
    let config = EngineConfig::for_test();
    let events = EventBus::new(16);
    let coactivation = CoactivationBuffer::new(100);

    let memory = add_memory(
        &store,
        &encryptor,
        &embedder,
        &config,
        None,
        &events,
        AddMemoryInput::new(b"content that will age and decay".to_vec()).with_tenant("frank"),
        1_000,
    )
    .await
    .unwrap();

    let scope = MaintenanceScope::single(Some("frank".to_string()));
    let far_future = 1_000 + 60 * 86_400_000;
    run_tick(&store, &config, &coactivation, &events, &scope, far_future).await;

    let after = hsg_core::persistence::PersistenceStore::get_mem(&store, memory.id, Some("frank"))
        .await
        .unwrap()
        .unwrap();
    assert!(after.salience < memory.salience);
}

#[tokio::test]
async fn metadata_filter_excludes_non_matching_rows() {
    init_tracing();
    let engine = test_engine();
    let mut matching = AddMemoryInput::new(b"a memory with project tag alpha".to_vec()).with_tenant("gail");
    matching.metadata = serde_json::json!({"project": "alpha"});
    let mut other = AddMemoryInput::new(b"a memory with project tag beta".to_vec()).with_tenant("gail");
    other.metadata = serde_json::json!({"project": "beta"});

    engine.add_memory(matching, 1_000).await.unwrap();
    engine.add_memory(other, 1_000).await.unwrap();

    let hits = engine
        .query(
            "project tag",
            10,
            QueryFilters {
                tenant: Some("gail".to_string()),
                metadata_equals: Some(("project".to_string(), serde_json::json!("alpha"))),
                ..Default::default()
            },
            None,
            2_000,
        )
        .await
        .unwrap();

    assert!(!hits.is_empty());
    for hit in &hits {
        let text = String::from_utf8_lossy(&hit.content);
        assert!(text.contains("alpha"), "unexpected hit outside the metadata filter: {text}");
    }
}
