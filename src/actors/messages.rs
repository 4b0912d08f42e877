//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Broadcast notifications published to multiple subscribers
//! 3. **Immutability**: All events are cloneable for multi-subscriber patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::registry::ServiceRecord;
use crate::storage::NotificationState;

/// Emitted when a service's reachability flips between consecutive probes
///
/// Derived while applying a probe result; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransitionEvent {
    pub name: String,
    pub previous_status: bool,
    pub new_status: bool,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle of the scheduler actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,

    /// Probes of the current tick are in flight
    Ticking,

    /// Shutdown requested, letting in-flight probes settle
    Draining,

    /// Actor has exited
    Stopped,
}

/// Summary of one completed tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// Sequence number, starting at 1
    pub tick: u64,

    /// Number of services probed
    pub probed: usize,

    /// Probe results applied to the registry (results for services removed
    /// mid-tick are discarded and not counted)
    pub applied: usize,

    pub transitions: Vec<StatusTransitionEvent>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

/// Commands that can be sent to the scheduler actor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a tick immediately (bypassing the interval timer)
    ///
    /// If a tick is already in flight the caller receives that tick's report.
    TickNow {
        respond_to: oneshot::Sender<TickReport>,
    },

    /// Get the current lifecycle state
    GetState {
        respond_to: oneshot::Sender<SchedulerState>,
    },

    /// Enter Draining and stop; resolves once in-flight probes settled or
    /// the grace period expired
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Commands that can be sent to the notifier actor
#[derive(Debug)]
pub enum NotifierCommand {
    /// Full re-render of the status message after transitions
    TransitionBatch {
        events: Vec<StatusTransitionEvent>,
        snapshot: Vec<ServiceRecord>,
    },

    /// Cheap latency-only edit of the existing message
    RefreshLatency { snapshot: Vec<ServiceRecord> },

    /// Get the persisted message reference
    GetState {
        respond_to: oneshot::Sender<Option<NotificationState>>,
    },

    /// Get delivery statistics
    GetStats {
        respond_to: oneshot::Sender<NotifierStats>,
    },

    Shutdown,
}

/// Notifier delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    /// Full renders delivered (edit or create)
    pub renders: u64,

    /// Latency-only refreshes delivered
    pub refreshes: u64,

    /// Messages created because none existed or the old one was gone
    pub created: u64,

    /// Deliveries that failed and were dropped
    pub failures: u64,

    /// Per-transition alerts posted to alert channels
    pub alerts: u64,
}

/// Commands that can be sent to the StorageActor
#[derive(Debug)]
pub enum StorageCommand {
    /// Upsert every record (sent once per tick)
    SaveRecords(Vec<ServiceRecord>),

    /// Upsert a single record
    Save(ServiceRecord),

    /// Delete a record by name
    Delete(String),

    /// Resolves once all previously queued writes were attempted
    Flush { respond_to: oneshot::Sender<()> },

    GetStats {
        respond_to: oneshot::Sender<StorageStats>,
    },

    Shutdown,
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Records written successfully
    pub records_written: u64,

    /// Records deleted
    pub records_deleted: u64,

    /// Failed write or delete operations
    pub failures: u64,
}
