//! Service registry
//!
//! The authoritative, mutable list of monitored services. Each record sits
//! behind its own mutex so probe results for different services are applied
//! without contending on a global lock; the outer map lock is only taken
//! for writing by add/remove.
//!
//! ## Incarnations
//!
//! Every `add` creates a new incarnation of a service name. Probe tasks carry
//! the incarnation they were started for, so a result that lands after the
//! service was removed (or removed and re-added) is discarded instead of
//! leaking into the fresh record.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace};

use crate::actors::messages::StatusTransitionEvent;
use crate::config::ServiceConfig;
use crate::history::{Aggregate, History, HistoryEntry, uptime_ratio};
use crate::probe::ProbeResult;
use crate::storage::{RecordStore, StorageResult};

/// Online services slower than this count as degraded
pub const DEGRADED_LATENCY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service '{0}' already exists")]
    DuplicateService(String),

    #[error("service '{0}' not found")]
    NotFound(String),
}

/// One monitored target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub target: String,

    /// Reachability according to the most recent probe, `false` until probed
    pub status: bool,

    /// Total probes applied, never reset
    pub checks: u64,

    /// Probes that found the service reachable
    pub successes: u64,

    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: u64,
    pub last_status_code: Option<u16>,
    pub last_detail: Option<String>,

    /// When the service last went from online to offline
    pub down_since: Option<DateTime<Utc>>,

    /// Insertion order, used to order snapshots
    pub position: u64,

    pub history: History,

    /// Registry generation of this name, bumped on every add or restore
    #[serde(skip)]
    pub incarnation: u64,
}

impl ServiceRecord {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        history_capacity: usize,
        position: u64,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            status: false,
            checks: 0,
            successes: 0,
            last_checked_at: None,
            last_latency_ms: 0,
            last_status_code: None,
            last_detail: None,
            down_since: None,
            position,
            history: History::with_capacity(history_capacity),
            incarnation: 0,
        }
    }

    pub fn uptime_ratio(&self) -> f64 {
        uptime_ratio(self.successes, self.checks)
    }

    pub fn uptime_percentage(&self) -> f64 {
        self.uptime_ratio() * 100.0
    }

    pub fn aggregate(&self) -> Aggregate {
        Aggregate::compute(self.successes, self.checks, &self.history)
    }

    /// Fold one probe result into the record
    ///
    /// Returns a transition iff `status` changed. The implicit initial status
    /// is `false`, so a first probe that succeeds is a transition.
    pub fn apply(&mut self, result: &ProbeResult, at: DateTime<Utc>) -> Option<StatusTransitionEvent> {
        let previous_status = self.status;

        self.checks += 1;
        if result.reachable {
            self.successes += 1;
        }
        self.status = result.reachable;
        self.last_checked_at = Some(at);
        self.last_latency_ms = result.latency_ms;
        self.last_status_code = result.code;
        self.last_detail = result.detail.clone();
        self.history.append(HistoryEntry {
            reachable: result.reachable,
            timestamp: at,
            latency_ms: result.latency_ms,
        });

        if previous_status == self.status {
            return None;
        }

        self.down_since = if self.status { None } else { Some(at) };

        Some(StatusTransitionEvent {
            name: self.name.clone(),
            previous_status,
            new_status: self.status,
            latency_ms: result.latency_ms,
            timestamp: at,
        })
    }
}

/// Latest latency of one service, pushed by the lightweight refresh timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySample {
    pub name: String,
    pub status: bool,
    pub latency_ms: u64,
}

/// Fleet-wide aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub online_count: usize,
    pub total_services: usize,

    /// Mean of per-service lifetime uptime percentages
    pub overall_uptime: f64,

    /// Mean of the most recent latencies
    pub avg_latency_ms: f64,

    /// Online services slower than [`DEGRADED_LATENCY_MS`]
    pub degraded_services: usize,

    /// Live feed sessions, filled in by the live sink
    pub connected_clients: usize,

    /// Live feed messages published, filled in by the live sink
    pub messages_sent: u64,
}

impl SystemStats {
    pub fn from_records(records: &[ServiceRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let total = records.len() as f64;
        Self {
            online_count: records.iter().filter(|r| r.status).count(),
            total_services: records.len(),
            overall_uptime: records.iter().map(ServiceRecord::uptime_percentage).sum::<f64>()
                / total,
            avg_latency_ms: records.iter().map(|r| r.last_latency_ms as f64).sum::<f64>() / total,
            degraded_services: records
                .iter()
                .filter(|r| r.status && r.last_latency_ms > DEGRADED_LATENCY_MS)
                .count(),
            connected_clients: 0,
            messages_sent: 0,
        }
    }
}

/// A unit of probe work handed out to the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTask {
    pub name: String,
    pub target: String,
    incarnation: u64,
}

struct Slot {
    incarnation: u64,
    record: Mutex<ServiceRecord>,
}

/// Thread-safe registry of monitored services
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<Slot>>>,
    history_capacity: usize,
    next_position: AtomicU64,
    next_incarnation: AtomicU64,
}

impl ServiceRegistry {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            history_capacity: history_capacity.max(1),
            next_position: AtomicU64::new(0),
            next_incarnation: AtomicU64::new(0),
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Register a new service with zeroed counters and empty history
    #[instrument(skip(self))]
    pub async fn add(&self, name: &str, target: &str) -> Result<ServiceRecord, RegistryError> {
        let mut services = self.services.write().await;
        if services.contains_key(name) {
            return Err(RegistryError::DuplicateService(name.to_string()));
        }

        let position = self.next_position.fetch_add(1, Ordering::Relaxed);
        let mut record = ServiceRecord::new(name, target, self.history_capacity, position);
        services.insert(name.to_string(), self.new_slot(&mut record));

        info!("registered service {name} ({target})");
        Ok(record)
    }

    /// Re-register a persisted record, keeping counters and history
    ///
    /// The history is truncated to this registry's capacity.
    pub async fn restore(&self, mut record: ServiceRecord) -> Result<(), RegistryError> {
        let mut services = self.services.write().await;
        if services.contains_key(&record.name) {
            return Err(RegistryError::DuplicateService(record.name));
        }

        record.history.set_capacity(self.history_capacity);
        self.next_position
            .fetch_max(record.position + 1, Ordering::Relaxed);

        debug!(
            "restored service {} (checks={}, successes={})",
            record.name, record.checks, record.successes
        );
        let slot = self.new_slot(&mut record);
        services.insert(record.name.clone(), slot);
        Ok(())
    }

    /// Deregister a service
    ///
    /// In-flight probe results for it are discarded when they arrive.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<ServiceRecord, RegistryError> {
        let slot = self
            .services
            .write()
            .await
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        info!("removed service {name}");
        let record = slot.record.lock().await.clone();
        Ok(record)
    }

    /// Change the probe target without resetting counters or history
    #[instrument(skip(self))]
    pub async fn update(&self, name: &str, new_target: &str) -> Result<ServiceRecord, RegistryError> {
        let slot = self.slot(name).await?;
        let mut record = slot.record.lock().await;
        record.target = new_target.to_string();

        info!("service {name} now targets {new_target}");
        Ok(record.clone())
    }

    /// Apply a probe result to the named service
    ///
    /// Returns the transition event, if any.
    pub async fn apply_result(
        &self,
        name: &str,
        result: &ProbeResult,
    ) -> Result<Option<StatusTransitionEvent>, RegistryError> {
        let slot = self.slot(name).await?;
        let mut record = slot.record.lock().await;
        Ok(record.apply(result, Utc::now()))
    }

    /// Apply a probe result for the incarnation the probe was started for
    ///
    /// Fails with `NotFound` if that incarnation is gone.
    pub async fn apply_probe(
        &self,
        task: &ProbeTask,
        result: &ProbeResult,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransitionEvent>, RegistryError> {
        let slot = self.slot(&task.name).await?;
        if slot.incarnation != task.incarnation {
            trace!("discarding result for replaced service {}", task.name);
            return Err(RegistryError::NotFound(task.name.clone()));
        }

        let mut record = slot.record.lock().await;
        Ok(record.apply(result, at))
    }

    /// Probe work for every registered service
    pub async fn probe_tasks(&self) -> Vec<ProbeTask> {
        let mut tasks = Vec::new();
        for slot in self.slots().await {
            let record = slot.record.lock().await;
            tasks.push((
                record.position,
                ProbeTask {
                    name: record.name.clone(),
                    target: record.target.clone(),
                    incarnation: slot.incarnation,
                },
            ));
        }
        tasks.sort_by_key(|(position, _)| *position);
        tasks.into_iter().map(|(_, task)| task).collect()
    }

    /// Copy of every record, in registration order
    pub async fn snapshot(&self) -> Vec<ServiceRecord> {
        let mut records = Vec::new();
        for slot in self.slots().await {
            records.push(slot.record.lock().await.clone());
        }
        records.sort_by_key(|record| record.position);
        records
    }

    pub async fn get(&self, name: &str) -> Option<ServiceRecord> {
        let slot = self.slot(name).await.ok()?;
        let record = slot.record.lock().await;
        Some(record.clone())
    }

    pub async fn aggregate(&self, name: &str) -> Result<Aggregate, RegistryError> {
        let slot = self.slot(name).await?;
        let record = slot.record.lock().await;
        Ok(record.aggregate())
    }

    /// Latest latency per service, without touching counters
    pub async fn latencies(&self) -> Vec<LatencySample> {
        self.snapshot()
            .await
            .into_iter()
            .map(|record| LatencySample {
                name: record.name,
                status: record.status,
                latency_ms: record.last_latency_ms,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// Load persisted records and register configured services
    ///
    /// Persisted records keep their counters; configured services without a
    /// persisted record are added fresh and saved. Configured targets win over
    /// persisted ones.
    #[instrument(skip_all)]
    pub async fn hydrate(
        &self,
        store: &dyn RecordStore,
        configured: &[ServiceConfig],
    ) -> StorageResult<usize> {
        let mut persisted = store.find().await?;
        persisted.sort_by_key(|record| record.position);

        for mut record in persisted {
            if let Some(service) = configured.iter().find(|s| s.name == record.name)
                && service.target != record.target
            {
                info!(
                    "service {} target changed in configuration: {} -> {}",
                    record.name, record.target, service.target
                );
                record.target = service.target.clone();
                store.save(&record).await?;
            }
            // Names are unique in the store, so this cannot collide
            let _ = self.restore(record).await;
        }

        for service in configured {
            if let Ok(record) = self.add(&service.name, &service.target).await {
                store.save(&record).await?;
            }
        }

        let count = self.len().await;
        info!("monitoring {count} services");
        Ok(count)
    }

    async fn slot(&self, name: &str) -> Result<Arc<Slot>, RegistryError> {
        self.services
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    async fn slots(&self) -> Vec<Arc<Slot>> {
        self.services.read().await.values().cloned().collect()
    }

    fn new_slot(&self, record: &mut ServiceRecord) -> Arc<Slot> {
        record.incarnation = self.next_incarnation.fetch_add(1, Ordering::Relaxed);
        Arc::new(Slot {
            incarnation: record.incarnation,
            record: Mutex::new(record.clone()),
        })
    }
}
