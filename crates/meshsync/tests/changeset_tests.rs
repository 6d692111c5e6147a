//! Integration tests for snapshot persistence and recovery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use meshsync::changeset::{ChangeSetEngine, EngineOptions, MemoryStateStore, SqliteStateStore, StateStore};

fn quick_retry() -> EngineOptions {
    EngineOptions {
        connect_retry: Duration::from_secs(1),
        ..Default::default()
    }
}

async fn wait_connected(engine: &ChangeSetEngine) {
    for _ in 0..100 {
        if engine.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("engine never connected");
}

#[tokio::test]
async fn test_sqlite_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(&db));
    let engine = ChangeSetEngine::start(store, EngineOptions::default()).await;
    let delta = engine.compute_config_delta(vec![
        cluster_object("a", "z", 1),
        cluster_object("b", "z", 1),
    ]);
    assert_eq!(delta.changed.len(), 2);
    let workloads = engine.compute_workload_delta(vec![service_manifest("apps", "web", 80)]);
    assert_eq!(workloads.changed.len(), 1);
    engine.close().await;

    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(&db));
    let engine = ChangeSetEngine::start(store, EngineOptions::default()).await;
    assert_eq!(engine.snapshot_sizes(), (2, 1));

    let delta = engine.compute_config_delta(vec![cluster_object("a", "z", 1)]);
    assert!(delta.changed.is_empty());
    assert_eq!(delta.deleted.len(), 1);
    assert_eq!(delta.deleted[0].id, "b");

    let workloads = engine.compute_workload_delta(vec![service_manifest("apps", "web", 81)]);
    assert_eq!(workloads.changed.len(), 1);
    assert!(workloads.deleted.is_empty());
    engine.close().await;
}

#[tokio::test]
async fn test_late_connect_loads_persisted_snapshot() {
    let store = MemoryStateStore::new();
    let engine = ChangeSetEngine::start(Arc::new(store.clone()), quick_retry()).await;
    engine.compute_config_delta(vec![cluster_object("a", "z", 1), cluster_object("b", "z", 1)]);
    engine.close().await;

    store.set_reachable(false);
    let engine = ChangeSetEngine::start(Arc::new(store.clone()), quick_retry()).await;
    assert!(!engine.is_connected());

    store.set_reachable(true);
    wait_connected(&engine).await;

    let delta = engine.compute_config_delta(vec![cluster_object("a", "z", 1)]);
    assert!(delta.changed.is_empty());
    assert_eq!(delta.deleted.len(), 1);
    engine.close().await;
}

#[tokio::test]
async fn test_diff_before_connect_wins_over_persisted_snapshot() {
    let store = MemoryStateStore::new();
    let engine = ChangeSetEngine::start(Arc::new(store.clone()), quick_retry()).await;
    engine.compute_config_delta(vec![cluster_object("a", "z", 1), cluster_object("b", "z", 1)]);
    engine.close().await;

    store.set_reachable(false);
    let engine = ChangeSetEngine::start(Arc::new(store.clone()), quick_retry()).await;
    let first = engine.compute_config_delta(vec![cluster_object("a", "z", 1)]);
    assert_eq!(first.changed.len(), 1);

    store.set_reachable(true);
    wait_connected(&engine).await;

    let delta = engine.compute_config_delta(vec![cluster_object("a", "z", 1)]);
    assert!(delta.changed.is_empty());
    assert!(delta.deleted.is_empty());
    engine.close().await;
}

#[tokio::test]
async fn test_unreachable_store_does_not_block_diffing() {
    let store = MemoryStateStore::unreachable();
    let engine = ChangeSetEngine::start(Arc::new(store.clone()), EngineOptions::default()).await;

    for instances in 0..20 {
        let delta = engine.compute_config_delta(vec![cluster_object("a", "z", instances)]);
        assert_eq!(delta.changed.len(), 1);
        let (config_pending, _) = engine.pending_persists();
        assert!(config_pending <= 1);
    }

    engine.close().await;
    assert!(store.peek("meshsync.gitops.config").is_none());
}
