use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Verdict;

/// Events pushed over the realtime audit feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Sent once when a subscriber connects.
    Ready { server_time: DateTime<Utc> },

    /// A row was appended to the audit log.
    AuditLogInsert {
        id: Uuid,
        verdict: Verdict,
        source: String,
        created_at: DateTime<Utc>,
    },
}
