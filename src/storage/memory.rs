//! In-memory record store (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Deployments where monitoring state may start fresh on every restart

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, RecordStore};
use super::error::StorageResult;
use super::schema::NotificationState;
use crate::registry::ServiceRecord;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ServiceRecord>>,
    notification: RwLock<Option<NotificationState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find(&self) -> StorageResult<Vec<ServiceRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn find_one(&self, name: &str) -> StorageResult<Option<ServiceRecord>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn save(&self, record: &ServiceRecord) -> StorageResult<()> {
        self.records
            .write()
            .await
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn save_batch(&self, records: &[ServiceRecord]) -> StorageResult<()> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.name.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        Ok(self.records.write().await.remove(name).is_some())
    }

    async fn load_notification_state(&self) -> StorageResult<Option<NotificationState>> {
        Ok(self.notification.read().await.clone())
    }

    async fn save_notification_state(&self, state: &NotificationState) -> StorageResult<()> {
        debug!("storing notification message {}", state.message_id);
        *self.notification.write().await = Some(state.clone());
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                (
                    "records".to_string(),
                    self.records.read().await.len().to_string(),
                ),
            ]),
        })
    }
}
