//! Record store trait definition

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::NotificationState;
use crate::registry::ServiceRecord;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Generic store for service records
///
/// Records are keyed by service name. There is exactly one
/// [`NotificationState`] document per store.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// storage actor, the notifier and the API.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`; implementations convert their
/// backend-specific errors to `StorageError` variants. Callers decide
/// whether a failure is fatal (startup) or tolerated (mid-run writes).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records, in no particular order
    async fn find(&self) -> StorageResult<Vec<ServiceRecord>>;

    async fn find_one(&self, name: &str) -> StorageResult<Option<ServiceRecord>>;

    /// Insert or replace the record with the same name
    async fn save(&self, record: &ServiceRecord) -> StorageResult<()>;

    /// Save several records
    ///
    /// Backends with transactions should override this to write atomically.
    async fn save_batch(&self, records: &[ServiceRecord]) -> StorageResult<()> {
        for record in records {
            self.save(record).await?;
        }
        Ok(())
    }

    /// Returns whether a record was deleted
    async fn delete(&self, name: &str) -> StorageResult<bool>;

    async fn load_notification_state(&self) -> StorageResult<Option<NotificationState>>;

    async fn save_notification_state(&self, state: &NotificationState) -> StorageResult<()>;

    /// Lightweight check that the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Release resources
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
