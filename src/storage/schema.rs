//! Persisted document shapes
//!
//! Service records are stored with their scalar fields as columns and the
//! bounded history as a JSON document; the history is small (capacity N)
//! and only ever read back as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to the edited-in-place chat status message
///
/// Persisted so a restart edits the same message instead of posting a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub channel_id: String,
    pub message_id: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "storage-sqlite")]
pub(crate) const CREATE_SERVICES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS services (
    name             TEXT PRIMARY KEY NOT NULL,
    target           TEXT NOT NULL,
    status           INTEGER NOT NULL DEFAULT 0,
    checks           INTEGER NOT NULL DEFAULT 0,
    successes        INTEGER NOT NULL DEFAULT 0,
    last_checked_at  INTEGER,
    last_latency_ms  INTEGER NOT NULL DEFAULT 0,
    last_status_code INTEGER,
    last_detail      TEXT,
    down_since       INTEGER,
    position         INTEGER NOT NULL DEFAULT 0,
    history          TEXT NOT NULL
)
"#;

#[cfg(feature = "storage-sqlite")]
pub(crate) const CREATE_NOTIFICATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS notification_state (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    channel_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;
