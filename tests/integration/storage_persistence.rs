//! Records survive a restart through the SQLite store

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use uptime_monitor::{
    actors::{
        scheduler::{SchedulerHandle, Sinks},
        storage::StorageHandle,
    },
    config::{ServiceConfig, StorageConfig},
    live::LiveBroadcaster,
    probe::ProbeResult,
    registry::ServiceRegistry,
    storage::{RecordStore, open_store},
};

use crate::helpers::{ScriptedProbe, manual_settings};

fn sqlite_config(dir: &TempDir) -> StorageConfig {
    StorageConfig::Sqlite {
        path: dir.path().join("uptime.db"),
    }
}

fn configured(name: &str, target: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        target: target.to_string(),
    }
}

#[tokio::test]
async fn test_counters_and_history_survive_restart() {
    let dir = TempDir::new().unwrap();
    let services = vec![
        configured("api", "http://api.test"),
        configured("db", "10.0.0.2:5432"),
    ];

    // First run
    let store = open_store(&sqlite_config(&dir)).await.unwrap();
    let registry = Arc::new(ServiceRegistry::new(20));
    assert_eq!(registry.hydrate(store.as_ref(), &services).await.unwrap(), 2);

    let probe = ScriptedProbe::new();
    probe.always("10.0.0.2:5432", false);
    let storage = StorageHandle::spawn(store.clone());
    let sinks = Sinks {
        live: LiveBroadcaster::new(registry.clone(), 16),
        notifier: None,
        storage: Some(storage.clone()),
    };
    let scheduler = SchedulerHandle::spawn(&manual_settings(), registry.clone(), probe, sinks);
    scheduler.tick_now().await.unwrap();
    scheduler.tick_now().await.unwrap();
    scheduler.shutdown().await.unwrap();

    storage.flush().await.unwrap();
    let before = registry.snapshot().await;
    assert!(before[0].checks >= 2);
    storage.shutdown().await;
    store.close().await.unwrap();

    // Second run
    let store = open_store(&sqlite_config(&dir)).await.unwrap();
    let restored = ServiceRegistry::new(20);
    assert_eq!(restored.hydrate(store.as_ref(), &services).await.unwrap(), 2);
    let after = restored.snapshot().await;

    assert_eq!(after.len(), 2);
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(new.name, old.name);
        assert_eq!(new.checks, old.checks);
        assert_eq!(new.successes, old.successes);
        assert_eq!(new.status, old.status);
        assert_eq!(new.history.len(), old.history.len());
        assert_eq!(new.down_since.is_some(), old.down_since.is_some());
    }
    assert!(after[0].status);
    assert!(!after[1].status);
}

#[tokio::test]
async fn test_runtime_services_are_restored() {
    let dir = TempDir::new().unwrap();

    let store = open_store(&sqlite_config(&dir)).await.unwrap();
    let registry = ServiceRegistry::new(20);
    registry.hydrate(store.as_ref(), &[]).await.unwrap();
    let record = registry.add("added-later", "http://later.test").await.unwrap();
    store.save(&record).await.unwrap();
    store.close().await.unwrap();

    let store = open_store(&sqlite_config(&dir)).await.unwrap();
    let restored = ServiceRegistry::new(20);
    restored.hydrate(store.as_ref(), &[]).await.unwrap();

    let record = restored.get("added-later").await.unwrap();
    assert_eq!(record.target, "http://later.test");
}

#[tokio::test]
async fn test_configured_target_wins_over_persisted() {
    let dir = TempDir::new().unwrap();

    let store = open_store(&sqlite_config(&dir)).await.unwrap();
    let registry = ServiceRegistry::new(20);
    registry
        .hydrate(store.as_ref(), &[configured("api", "http://old.test")])
        .await
        .unwrap();
    store.close().await.unwrap();

    let store = open_store(&sqlite_config(&dir)).await.unwrap();
    let restored = ServiceRegistry::new(20);
    restored
        .hydrate(store.as_ref(), &[configured("api", "http://new.test")])
        .await
        .unwrap();

    assert_eq!(restored.get("api").await.unwrap().target, "http://new.test");
    let persisted = store.find_one("api").await.unwrap().unwrap();
    assert_eq!(persisted.target, "http://new.test");
}

#[tokio::test]
async fn test_stale_tick_save_does_not_resurrect_deleted_service() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&sqlite_config(&dir)).await.unwrap();

    let registry = ServiceRegistry::new(20);
    let record = registry.add("gone", "http://gone.test").await.unwrap();
    let storage = StorageHandle::spawn(store.clone());
    storage.save(record.clone()).await.unwrap();

    let stale_tick = registry.snapshot().await;
    registry.remove("gone").await.unwrap();
    storage.delete("gone").await.unwrap();
    storage.save_records(stale_tick);
    storage.flush().await.unwrap();

    assert!(store.find_one("gone").await.unwrap().is_none());

    // Registering the name again lifts the tombstone
    storage.save(record).await.unwrap();
    storage.flush().await.unwrap();
    assert!(store.find_one("gone").await.unwrap().is_some());
}

#[tokio::test]
async fn test_stale_tick_save_does_not_overwrite_readded_service() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&sqlite_config(&dir)).await.unwrap();

    let registry = ServiceRegistry::new(20);
    registry.add("api", "http://old.test").await.unwrap();
    registry
        .apply_result("api", &ProbeResult::up(10, Some(200), "OK"))
        .await
        .unwrap();
    let storage = StorageHandle::spawn(store.clone());

    let stale_tick = registry.snapshot().await;
    registry.remove("api").await.unwrap();
    storage.delete("api").await.unwrap();
    let readded = registry.add("api", "http://new.test").await.unwrap();
    storage.save(readded).await.unwrap();
    storage.save_records(stale_tick);
    storage.flush().await.unwrap();

    let persisted = store.find_one("api").await.unwrap().unwrap();
    assert_eq!(persisted.target, "http://new.test");
    assert_eq!(persisted.checks, 0);
}
