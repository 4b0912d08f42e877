//! Shared fakes for integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uptime_monitor::{
    actors::{
        notifier::NotifierHandle,
        scheduler::{SchedulerHandle, Sinks},
    },
    config::MonitorSettings,
    discord::{ChatError, ChatTransport, EditOutcome, Message, MessageRef},
    live::LiveBroadcaster,
    probe::{Probe, ProbeResult},
    registry::ServiceRegistry,
    status_board::StatusBoard,
    storage::RecordStore,
};

pub const CHANNEL_ID: &str = "1234";

/// Probe answering from a per-target script
///
/// Each target pops its next scripted reachability; once a script runs out
/// (or for unknown targets) the fallback is used.
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, Vec<bool>>>,
    fallback: Mutex<HashMap<String, bool>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, target: &str, results: &[bool]) {
        let mut queue = results.to_vec();
        queue.reverse();
        self.scripts.lock().unwrap().insert(target.to_string(), queue);
    }

    pub fn always(&self, target: &str, reachable: bool) {
        self.fallback
            .lock()
            .unwrap()
            .insert(target.to_string(), reachable);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, target: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(|queue| queue.pop());
        let reachable = scripted
            .or_else(|| self.fallback.lock().unwrap().get(target).copied())
            .unwrap_or(true);

        if reachable {
            ProbeResult::up(25, Some(200), "OK")
        } else {
            ProbeResult::down(40, None, "connection refused")
        }
    }
}

/// Chat transport recording every call
#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<Message>>,
    pub edits: Mutex<Vec<(String, Message)>>,
    /// Message ids that report NotFound on edit
    pub gone: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().unwrap().len()
    }

    pub fn delete_message(&self, message_id: &str) {
        self.gone.lock().unwrap().push(message_id.to_string());
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    fn channel_id(&self) -> &str {
        CHANNEL_ID
    }

    async fn send_to(&self, channel_id: &str, message: &Message) -> Result<MessageRef, ChatError> {
        self.sent.lock().unwrap().push(message.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            channel_id: channel_id.to_string(),
            message_id: format!("msg-{id}"),
        })
    }

    async fn edit(&self, target: &MessageRef, message: &Message) -> Result<EditOutcome, ChatError> {
        if self.gone.lock().unwrap().contains(&target.message_id) {
            return Ok(EditOutcome::NotFound);
        }
        self.edits
            .lock()
            .unwrap()
            .push((target.message_id.clone(), message.clone()));
        Ok(EditOutcome::Edited)
    }
}

/// Settings where only `tick_now` drives ticks
pub fn manual_settings() -> MonitorSettings {
    MonitorSettings {
        tick_interval_ms: 3_600_000,
        latency_refresh_interval_ms: 3_600_000,
        probe_timeout_ms: 500,
        history_capacity: 20,
        drain_grace_ms: 200,
    }
}

pub fn board() -> StatusBoard {
    StatusBoard::new("Live Service Status", "Uptime Monitor")
}

pub fn spawn_notifier(transport: Arc<FakeTransport>, store: Arc<dyn RecordStore>) -> NotifierHandle {
    NotifierHandle::spawn(transport, store, board())
}

/// Spawn a scheduler over an empty registry and let its startup tick finish
///
/// Services registered afterwards are only probed by explicit `tick_now`
/// calls, so tests can count ticks exactly.
pub async fn spawn_scheduler(
    registry: Arc<ServiceRegistry>,
    probe: Arc<ScriptedProbe>,
    notifier: Option<NotifierHandle>,
) -> (SchedulerHandle, LiveBroadcaster) {
    assert!(registry.is_empty().await);

    let live = LiveBroadcaster::new(registry.clone(), 64);
    let sinks = Sinks {
        live: live.clone(),
        notifier,
        storage: None,
    };
    let scheduler = SchedulerHandle::spawn(&manual_settings(), registry, probe, sinks);
    scheduler.tick_now().await.unwrap();

    (scheduler, live)
}
