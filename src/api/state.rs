//! API shared state containing the registry and actor handles

use std::sync::Arc;

use crate::actors::{notifier::NotifierHandle, scheduler::SchedulerHandle, storage::StorageHandle};
use crate::live::LiveBroadcaster;
use crate::registry::ServiceRegistry;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Registry the scheduler probes; mutations take effect on the next tick
    pub registry: Arc<ServiceRegistry>,

    /// Live feed for WebSocket sessions
    pub live: LiveBroadcaster,

    /// Writer for registry mutations (absent when nothing is persisted)
    pub storage: Option<StorageHandle>,

    pub notifier: Option<NotifierHandle>,

    pub scheduler: Option<SchedulerHandle>,
}

impl ApiState {
    pub fn new(registry: Arc<ServiceRegistry>, live: LiveBroadcaster) -> Self {
        Self {
            registry,
            live,
            storage: None,
            notifier: None,
            scheduler: None,
        }
    }

    pub fn with_storage(mut self, storage: StorageHandle) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_notifier(mut self, notifier: NotifierHandle) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}
