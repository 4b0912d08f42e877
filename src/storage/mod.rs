//! Record store for service state
//!
//! This module provides a trait-based abstraction over wherever service
//! records and the notification message reference are persisted. The
//! monitoring core only needs find/find_one/save/delete plus the singleton
//! notification document.
//!
//! ## Backends
//!
//! - **In-Memory** (default): No persistence, for tests or throwaway runs
//! - **SQLite**: Embedded database file, survives restarts
//!
//! ## Usage
//!
//! ```no_run
//! use uptime_monitor::storage::{RecordStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./uptime.db").await?;
//!     let records = store.find().await?;
//!     println!("{} persisted services", records.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use backend::{HealthStatus, RecordStore};
pub use error::{StorageError, StorageResult};
pub use schema::NotificationState;

use crate::config::StorageConfig;

/// Open the store selected in the configuration
pub async fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn RecordStore>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage (no persistence)");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "sqlite storage requires the `storage-sqlite` feature".to_string(),
        )),
    }
}
