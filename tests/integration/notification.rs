//! Status message lifecycle across deletions and restarts

use std::sync::Arc;

use chrono::Utc;
use pretty_assertions::assert_eq;
use uptime_monitor::{
    actors::messages::StatusTransitionEvent,
    probe::ProbeResult,
    registry::ServiceRecord,
    storage::{NotificationState, RecordStore, memory::MemoryStore},
};

use crate::helpers::{CHANNEL_ID, FakeTransport, spawn_notifier};

fn online_snapshot() -> (Vec<StatusTransitionEvent>, Vec<ServiceRecord>) {
    let mut record = ServiceRecord::new("api", "http://api.test", 20, 0);
    let event = record
        .apply(&ProbeResult::up(31, Some(200), "OK"), Utc::now())
        .unwrap();
    (vec![event], vec![record])
}

#[tokio::test]
async fn test_deleted_message_is_recreated_on_next_transition() {
    let transport = FakeTransport::new();
    let store = Arc::new(MemoryStore::new());
    let notifier = spawn_notifier(transport.clone(), store.clone());

    let (events, snapshot) = online_snapshot();
    notifier.notify_transitions(events.clone(), snapshot.clone());
    assert_eq!(notifier.get_stats().await.unwrap().created, 1);

    transport.delete_message("msg-1");
    notifier.notify_transitions(events, snapshot);

    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.created, 2);
    assert_eq!(stats.failures, 0);
    assert_eq!(transport.sent_count(), 2);

    let persisted = store.load_notification_state().await.unwrap().unwrap();
    assert_eq!(persisted.message_id, "msg-2");
}

#[tokio::test]
async fn test_restart_edits_the_persisted_message() {
    let store = Arc::new(MemoryStore::new());
    let (events, snapshot) = online_snapshot();

    let first = FakeTransport::new();
    let notifier = spawn_notifier(first.clone(), store.clone());
    notifier.notify_transitions(events.clone(), snapshot.clone());
    assert_eq!(notifier.get_stats().await.unwrap().created, 1);
    notifier.shutdown().await;

    let second = FakeTransport::new();
    let restarted = spawn_notifier(second.clone(), store.clone());
    restarted.notify_transitions(events, snapshot);

    let stats = restarted.get_stats().await.unwrap();
    assert_eq!(stats.created, 0);
    assert_eq!(stats.renders, 1);
    assert_eq!(second.sent_count(), 0);
    assert_eq!(second.edits.lock().unwrap()[0].0, "msg-1");
}

#[tokio::test]
async fn test_message_in_other_channel_is_not_edited() {
    let store = Arc::new(MemoryStore::new());
    store
        .save_notification_state(&NotificationState {
            channel_id: "elsewhere".into(),
            message_id: "old".into(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let transport = FakeTransport::new();
    let notifier = spawn_notifier(transport.clone(), store.clone());
    let (events, snapshot) = online_snapshot();
    notifier.notify_transitions(events, snapshot);

    assert_eq!(notifier.get_stats().await.unwrap().created, 1);
    assert_eq!(transport.edit_count(), 0);

    let persisted = store.load_notification_state().await.unwrap().unwrap();
    assert_eq!(persisted.channel_id, CHANNEL_ID);
}

#[tokio::test]
async fn test_latency_refresh_only_edits() {
    let transport = FakeTransport::new();
    let notifier = spawn_notifier(transport.clone(), Arc::new(MemoryStore::new()));
    let (events, snapshot) = online_snapshot();

    // Nothing posted yet: the refresh must not create a message
    notifier.refresh_latency(snapshot.clone());
    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.refreshes, 0);
    assert_eq!(transport.sent_count(), 0);

    notifier.notify_transitions(events, snapshot.clone());
    notifier.refresh_latency(snapshot);

    let stats = notifier.get_stats().await.unwrap();
    assert_eq!(stats.refreshes, 1);
    assert_eq!(stats.renders, 1);
    assert_eq!(transport.sent_count(), 1);
    assert_eq!(transport.edit_count(), 1);
}
