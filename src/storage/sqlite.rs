//! SQLite record store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the per-tick writes
//! - **Connection pooling**: Efficient resource usage
//! - **Self-initialising**: Tables are created on connect

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, RecordStore};
use super::error::{StorageError, StorageResult};
use super::schema::{CREATE_NOTIFICATION_TABLE, CREATE_SERVICES_TABLE, NotificationState};
use crate::history::History;
use crate::registry::ServiceRecord;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (and create if missing) the database file
    ///
    /// ```no_run
    /// # use uptime_monitor::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./uptime.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("creating tables");
        for statement in [CREATE_SERVICES_TABLE, CREATE_NOTIFICATION_TABLE] {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StorageError::SchemaFailed(e.to_string()))?;
        }

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn row_to_record(row: &SqliteRow) -> StorageResult<ServiceRecord> {
        let history_json: String = row.try_get("history")?;
        let history: History = serde_json::from_str(&history_json)?;

        Ok(ServiceRecord {
            name: row.try_get("name")?,
            target: row.try_get("target")?,
            status: row.try_get::<i64, _>("status")? != 0,
            checks: row.try_get::<i64, _>("checks")? as u64,
            successes: row.try_get::<i64, _>("successes")? as u64,
            last_checked_at: row
                .try_get::<Option<i64>, _>("last_checked_at")?
                .map(Self::millis_to_timestamp),
            last_latency_ms: row.try_get::<i64, _>("last_latency_ms")? as u64,
            last_status_code: row
                .try_get::<Option<i64>, _>("last_status_code")?
                .map(|code| code as u16),
            last_detail: row.try_get("last_detail")?,
            down_since: row
                .try_get::<Option<i64>, _>("down_since")?
                .map(Self::millis_to_timestamp),
            position: row.try_get::<i64, _>("position")? as u64,
            history,
            incarnation: 0,
        })
    }

    fn upsert_query(
        record: &ServiceRecord,
        history_json: String,
    ) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        sqlx::query(
            r#"
            INSERT INTO services (
                name, target, status, checks, successes, last_checked_at,
                last_latency_ms, last_status_code, last_detail, down_since,
                position, history
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                target = excluded.target,
                status = excluded.status,
                checks = excluded.checks,
                successes = excluded.successes,
                last_checked_at = excluded.last_checked_at,
                last_latency_ms = excluded.last_latency_ms,
                last_status_code = excluded.last_status_code,
                last_detail = excluded.last_detail,
                down_since = excluded.down_since,
                position = excluded.position,
                history = excluded.history
            "#,
        )
        .bind(&record.name)
        .bind(&record.target)
        .bind(record.status as i64)
        .bind(record.checks as i64)
        .bind(record.successes as i64)
        .bind(record.last_checked_at.as_ref().map(Self::timestamp_to_millis))
        .bind(record.last_latency_ms as i64)
        .bind(record.last_status_code.map(i64::from))
        .bind(&record.last_detail)
        .bind(record.down_since.as_ref().map(Self::timestamp_to_millis))
        .bind(record.position as i64)
        .bind(history_json)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find(&self) -> StorageResult<Vec<ServiceRecord>> {
        let rows = sqlx::query("SELECT * FROM services ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn find_one(&self, name: &str) -> StorageResult<Option<ServiceRecord>> {
        let row = sqlx::query("SELECT * FROM services WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn save(&self, record: &ServiceRecord) -> StorageResult<()> {
        let history_json = serde_json::to_string(&record.history)?;
        Self::upsert_query(record, history_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn save_batch(&self, records: &[ServiceRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let history_json = serde_json::to_string(&record.history)?;
            Self::upsert_query(record, history_json)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("saved {} records", records.len());
        Ok(())
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM services WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_notification_state(&self) -> StorageResult<Option<NotificationState>> {
        let row = sqlx::query(
            "SELECT channel_id, message_id, updated_at FROM notification_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> StorageResult<NotificationState> {
            Ok(NotificationState {
                channel_id: row.try_get("channel_id")?,
                message_id: row.try_get("message_id")?,
                updated_at: Self::millis_to_timestamp(row.try_get("updated_at")?),
            })
        })
        .transpose()
    }

    async fn save_notification_state(&self, state: &NotificationState) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_state (id, channel_id, message_id, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                channel_id = excluded.channel_id,
                message_id = excluded.message_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.channel_id)
        .bind(&state.message_id)
        .bind(Self::timestamp_to_millis(&state.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT COUNT(*) AS count FROM services")
            .fetch_one(&self.pool)
            .await
        {
            Ok(row) => {
                let count: i64 = row.try_get("count")?;
                let metadata = HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                    ("records".to_string(), count.to_string()),
                ]);

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite store operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
