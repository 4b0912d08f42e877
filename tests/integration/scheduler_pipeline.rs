//! End-to-end tick behaviour: registry, transitions and the notifier

use std::sync::Arc;

use pretty_assertions::assert_eq;
use uptime_monitor::{
    actors::messages::SchedulerState, registry::ServiceRegistry, storage::memory::MemoryStore,
};

use crate::helpers::{FakeTransport, ScriptedProbe, spawn_notifier, spawn_scheduler};

#[tokio::test]
async fn test_example_sequence_counts_and_transitions() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, _live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;

    registry.add("api", "http://api.test").await.unwrap();
    probe.script("http://api.test", &[true, true, false, false, true]);

    let mut transitions_at = Vec::new();
    for probe_number in 1..=5 {
        let report = scheduler.tick_now().await.unwrap();
        for event in report.transitions {
            transitions_at.push((probe_number, event.previous_status, event.new_status));
        }
    }

    let record = registry.get("api").await.unwrap();
    assert!(record.status);
    assert_eq!(record.checks, 5);
    assert_eq!(record.successes, 3);
    assert_eq!(record.history.len(), 5);

    // The first successful probe leaves the implicit offline default
    assert_eq!(
        transitions_at,
        vec![(1, false, true), (3, true, false), (5, false, true)]
    );

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_service_does_not_affect_the_rest() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, _live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;

    registry.add("broken", "http://broken.test").await.unwrap();
    probe.always("http://broken.test", false);
    for i in 0..8 {
        registry
            .add(&format!("ok-{i}"), &format!("http://ok-{i}.test"))
            .await
            .unwrap();
    }

    let report = scheduler.tick_now().await.unwrap();

    assert_eq!(report.probed, 9);
    assert_eq!(report.applied, 9);
    assert_eq!(report.transitions.len(), 8);

    for record in registry.snapshot().await {
        assert_eq!(record.checks, 1);
        assert_eq!(record.status, record.name != "broken", "{}", record.name);
    }

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_steady_ticks_never_render() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let transport = FakeTransport::new();
    let notifier = spawn_notifier(transport.clone(), Arc::new(MemoryStore::new()));
    let (scheduler, _live) =
        spawn_scheduler(registry.clone(), probe.clone(), Some(notifier.clone())).await;

    registry.add("api", "http://api.test").await.unwrap();
    registry.add("db", "http://db.test").await.unwrap();
    probe.always("http://db.test", false);

    // api comes online: one render for the whole tick
    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.transitions.len(), 1);
    let after_first = notifier.get_stats().await.unwrap();
    assert_eq!(after_first.renders, 1);

    for _ in 0..10 {
        let report = scheduler.tick_now().await.unwrap();
        assert!(report.transitions.is_empty());
    }

    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.renders, 1);
    assert_eq!(transport.sent_count(), 1);
    assert_eq!(transport.edit_count(), 0);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_simultaneous_transitions_render_once() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let transport = FakeTransport::new();
    let notifier = spawn_notifier(transport.clone(), Arc::new(MemoryStore::new()));
    let (scheduler, _live) =
        spawn_scheduler(registry.clone(), probe.clone(), Some(notifier.clone())).await;

    for name in ["a", "b", "c"] {
        registry
            .add(name, &format!("http://{name}.test"))
            .await
            .unwrap();
        probe.script(&format!("http://{name}.test"), &[true, false]);
    }

    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.transitions.len(), 3);
    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.transitions.len(), 3);

    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.renders, 2);
    assert_eq!(stats.created, 1);
    assert_eq!(transport.edit_count(), 1);

    let (_, last) = transport.edits.lock().unwrap().last().cloned().unwrap();
    let embed = &last.embeds[0];
    assert!(
        embed
            .description
            .as_deref()
            .unwrap()
            .contains("Major System Outage")
    );

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reregistered_service_starts_fresh() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, _live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;

    registry.add("svc-a", "http://x.test").await.unwrap();
    scheduler.tick_now().await.unwrap();
    scheduler.tick_now().await.unwrap();
    assert_eq!(registry.get("svc-a").await.unwrap().checks, 2);

    registry.remove("svc-a").await.unwrap();
    let fresh = registry.add("svc-a", "http://y.test").await.unwrap();
    assert_eq!(fresh.checks, 0);
    assert!(fresh.history.is_empty());

    scheduler.tick_now().await.unwrap();
    let record = registry.get("svc-a").await.unwrap();
    assert_eq!(record.checks, 1);
    assert_eq!(record.target, "http://y.test");

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_the_scheduler() {
    let registry = Arc::new(ServiceRegistry::new(20));
    let probe = ScriptedProbe::new();
    let (scheduler, _live) = spawn_scheduler(registry.clone(), probe.clone(), None).await;

    registry.add("api", "http://api.test").await.unwrap();
    scheduler.tick_now().await.unwrap();
    assert_eq!(scheduler.state().await, SchedulerState::Idle);

    scheduler.shutdown().await.unwrap();

    assert_eq!(scheduler.state().await, SchedulerState::Stopped);
    assert!(scheduler.tick_now().await.is_err());
    let calls = probe.calls();
    assert_eq!(registry.get("api").await.unwrap().checks as usize, calls);
}
