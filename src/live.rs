//! Live broadcast sink
//!
//! Fans monitoring updates out to every connected dashboard session over a
//! Tokio broadcast channel. Delivery is best-effort per session: a slow
//! session lags (and skips events) on its own receiver, it never blocks the
//! publisher or other sessions.
//!
//! New sessions get a full `initial_state` snapshot on subscribe, so a client
//! that connects between ticks is never blank.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace, warn};

use crate::actors::messages::StatusTransitionEvent;
use crate::registry::{LatencySample, ServiceRecord, ServiceRegistry, SystemStats};

/// Default number of events buffered per session before it lags
pub const DEFAULT_LIVE_CAPACITY: usize = 256;

/// Events pushed to dashboard sessions, serialized with a `type` tag
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Sent once, to a single session, right after it subscribed
    InitialState {
        services: Vec<ServiceRecord>,
        stats: SystemStats,
        timestamp: DateTime<Utc>,
    },

    /// Full state after every tick
    Snapshot {
        services: Vec<ServiceRecord>,
        stats: SystemStats,
        timestamp: DateTime<Utc>,
    },

    Transition { event: StatusTransitionEvent },

    /// Latest latency numbers only
    Latency {
        latencies: Vec<LatencySample>,
        timestamp: DateTime<Utc>,
    },

    Heartbeat {
        stats: SystemStats,
        timestamp: DateTime<Utc>,
    },
}

struct LiveInner {
    tx: broadcast::Sender<LiveEvent>,
    registry: Arc<ServiceRegistry>,
    connected: AtomicUsize,
    messages_sent: AtomicU64,
}

/// Publisher side of the live feed
#[derive(Clone)]
pub struct LiveBroadcaster {
    inner: Arc<LiveInner>,
}

impl LiveBroadcaster {
    pub fn new(registry: Arc<ServiceRegistry>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(LiveInner {
                tx,
                registry,
                connected: AtomicUsize::new(0),
                messages_sent: AtomicU64::new(0),
            }),
        }
    }

    /// Fan an event out to every subscribed session
    ///
    /// Returns the number of sessions it was queued for; never blocks.
    pub fn broadcast(&self, event: LiveEvent) -> usize {
        match self.inner.tx.send(event) {
            Ok(receivers) => {
                self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
                receivers
            }
            Err(_) => {
                trace!("no live sessions, event dropped");
                0
            }
        }
    }

    pub fn publish_snapshot(&self, services: Vec<ServiceRecord>) -> usize {
        let stats = self.stats_for(&services);
        self.broadcast(LiveEvent::Snapshot {
            services,
            stats,
            timestamp: Utc::now(),
        })
    }

    pub fn publish_transition(&self, event: StatusTransitionEvent) -> usize {
        self.broadcast(LiveEvent::Transition { event })
    }

    pub fn publish_latencies(&self, latencies: Vec<LatencySample>) -> usize {
        self.broadcast(LiveEvent::Latency {
            latencies,
            timestamp: Utc::now(),
        })
    }

    /// Register a session
    ///
    /// The receiver is created before the snapshot is taken, so any tick
    /// completing in between is delivered through the receiver as well.
    pub async fn subscribe(&self) -> LiveSubscription {
        let receiver = self.inner.tx.subscribe();
        self.inner.connected.fetch_add(1, Ordering::Relaxed);

        let services = self.inner.registry.snapshot().await;
        let stats = self.stats_for(&services);
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);

        debug!(
            "live session subscribed ({} connected)",
            self.connected_clients()
        );

        LiveSubscription {
            initial: Some(LiveEvent::InitialState {
                services,
                stats,
                timestamp: Utc::now(),
            }),
            receiver,
            inner: self.inner.clone(),
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.inner.connected.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    /// Fleet stats including the live feed counters
    pub fn stats_for(&self, services: &[ServiceRecord]) -> SystemStats {
        SystemStats {
            connected_clients: self.connected_clients(),
            messages_sent: self.messages_sent(),
            ..SystemStats::from_records(services)
        }
    }

    /// Periodically publish a heartbeat with current stats
    pub fn spawn_heartbeat(&self, every: Duration) -> JoinHandle<()> {
        let live = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let services = live.inner.registry.snapshot().await;
                let stats = live.stats_for(&services);
                live.broadcast(LiveEvent::Heartbeat {
                    stats,
                    timestamp: Utc::now(),
                });
            }
        })
    }
}

/// One dashboard session's view of the live feed
pub struct LiveSubscription {
    initial: Option<LiveEvent>,
    receiver: broadcast::Receiver<LiveEvent>,
    inner: Arc<LiveInner>,
}

impl LiveSubscription {
    /// Next event for this session, `None` once the feed is closed
    ///
    /// The first call yields the initial snapshot. Lagging sessions skip the
    /// events they missed.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("live session lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.inner.connected.fetch_sub(1, Ordering::Relaxed);
    }
}
