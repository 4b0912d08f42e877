//! StorageActor - Persists service records mid-run
//!
//! ## Ordering
//!
//! All writes go through a single mpsc channel and are applied one after
//! another, so a `Delete` from the API is never overtaken by an older save.
//!
//! ## Failure tolerance
//!
//! A failed write is logged and counted, never retried: the scheduler sends
//! the full record set every tick, so the next tick's write self-corrects.
//!
//! ## Tombstones and incarnations
//!
//! A tick snapshot taken just before an API delete may arrive after the
//! delete, or even after the name was registered again. Deleted names are
//! remembered until they are saved again through [`StorageHandle::save`]
//! (re-add), and skipped in per-tick batches. Each `save` also records the
//! record's registry incarnation; batch records of an older incarnation are
//! skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, trace, warn};

use super::messages::{StorageCommand, StorageStats};
use crate::registry::ServiceRecord;
use crate::storage::RecordStore;

/// Commands buffered before per-tick saves start being dropped
const COMMAND_BUFFER: usize = 256;

pub struct StorageActor {
    store: Arc<dyn RecordStore>,
    command_rx: mpsc::Receiver<StorageCommand>,
    tombstones: HashSet<String>,
    /// Newest incarnation saved through `save`, per name
    incarnations: HashMap<String, u64>,
    stats: StorageStats,
}

impl StorageActor {
    pub fn new(store: Arc<dyn RecordStore>, command_rx: mpsc::Receiver<StorageCommand>) -> Self {
        Self {
            store,
            command_rx,
            tombstones: HashSet::new(),
            incarnations: HashMap::new(),
            stats: StorageStats::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting storage actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                StorageCommand::SaveRecords(records) => {
                    let records: Vec<ServiceRecord> = records
                        .into_iter()
                        .filter(|r| self.is_current(r))
                        .collect();
                    self.save_batch(&records).await;
                }

                StorageCommand::Save(record) => {
                    self.tombstones.remove(&record.name);
                    let newest = self
                        .incarnations
                        .entry(record.name.clone())
                        .or_insert(record.incarnation);
                    *newest = (*newest).max(record.incarnation);
                    self.save_batch(std::slice::from_ref(&record)).await;
                }

                StorageCommand::Delete(name) => {
                    match self.store.delete(&name).await {
                        Ok(deleted) => {
                            trace!("deleted record {name} (existed: {deleted})");
                            self.stats.records_deleted += u64::from(deleted);
                        }
                        Err(e) => {
                            error!("failed to delete record {name}: {e}");
                            self.stats.failures += 1;
                        }
                    }
                    self.tombstones.insert(name);
                }

                StorageCommand::Flush { respond_to } => {
                    let _ = respond_to.send(());
                }

                StorageCommand::GetStats { respond_to } => {
                    let _ = respond_to.send(self.stats.clone());
                }

                StorageCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("storage actor stopped");
    }

    fn is_current(&self, record: &ServiceRecord) -> bool {
        if self.tombstones.contains(&record.name) {
            return false;
        }
        match self.incarnations.get(&record.name) {
            Some(newest) if record.incarnation < *newest => {
                trace!(
                    "skipping stale save of {} (incarnation {} < {newest})",
                    record.name, record.incarnation
                );
                false
            }
            _ => true,
        }
    }

    async fn save_batch(&mut self, records: &[ServiceRecord]) {
        if records.is_empty() {
            return;
        }

        match self.store.save_batch(records).await {
            Ok(()) => {
                trace!("persisted {} records", records.len());
                self.stats.records_written += records.len() as u64;
            }
            Err(e) => {
                warn!("failed to persist {} records: {e}", records.len());
                self.stats.failures += 1;
            }
        }
    }
}

/// Handle for the StorageActor
#[derive(Clone)]
pub struct StorageHandle {
    sender: mpsc::Sender<StorageCommand>,
}

impl StorageHandle {
    pub fn spawn(store: Arc<dyn RecordStore>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

        let actor = StorageActor::new(store, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Queue a per-tick save without waiting
    ///
    /// Dropped (and logged) when the writer is backed up; the next tick
    /// carries the same records again.
    pub fn save_records(&self, records: Vec<ServiceRecord>) {
        if let Err(e) = self.sender.try_send(StorageCommand::SaveRecords(records)) {
            warn!("storage writer busy, skipping this tick's save: {e}");
        }
    }

    pub async fn save(&self, record: ServiceRecord) -> anyhow::Result<()> {
        self.sender.send(StorageCommand::Save(record)).await?;
        Ok(())
    }

    pub async fn delete(&self, name: impl Into<String>) -> anyhow::Result<()> {
        self.sender.send(StorageCommand::Delete(name.into())).await?;
        Ok(())
    }

    /// Wait until every previously queued write was attempted
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::Flush { respond_to: tx })
            .await?;

        rx.await?;
        Ok(())
    }

    pub async fn get_stats(&self) -> Option<StorageStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(StorageCommand::Shutdown).await;
    }
}
