//! Best-effort writes that follow a decided response: the audit ledger,
//! the chat log and conversation context lookups. Failures are logged and
//! swallowed so they never change what the caller receives.

use tracing::{debug, error, warn};
use uuid::Uuid;

use bento_db::models::{AuditLogRow, NewAuditLog, NewChatMessage};
use bento_db::parse_timestamp;
use bento_shield::context::{CONTEXT_TURNS, Turn, build_conversation_context};
use bento_types::events::FeedEvent;
use bento_types::models::{ChatRole, MessageStatus, Verdict};

use crate::state::{AppState, blocking};

/// Append to the audit log and announce the insert on the realtime feed.
pub async fn record(state: &AppState, log: NewAuditLog) -> Option<AuditLogRow> {
    let row = match blocking(state, move |db| db.insert_audit_log(&log)).await {
        Ok(row) => row,
        Err(_) => {
            error!("Failed to write audit log");
            return None;
        }
    };

    let event = FeedEvent::AuditLogInsert {
        id: row.id.parse().unwrap_or_else(|_| Uuid::nil()),
        verdict: row.verdict.parse().unwrap_or(Verdict::Flagged),
        source: row.source.clone(),
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(chrono::Utc::now),
    };
    let receivers = state.dispatcher.broadcast(event);
    debug!("Audit log {} broadcast to {} subscriber(s)", row.id, receivers);

    Some(row)
}

/// A chat line to persist under a conversation.
pub struct ChatEntry {
    pub conversation_id: String,
    pub role: ChatRole,
    pub content: String,
    pub status: MessageStatus,
    pub latency_ms: f64,
    pub scrubbed_count: i64,
    pub title: Option<String>,
    pub model: Option<String>,
}

impl ChatEntry {
    pub fn new(conversation_id: &str, role: ChatRole, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            role,
            content: content.into(),
            status,
            latency_ms: 0.0,
            scrubbed_count: 0,
            title: None,
            model: None,
        }
    }
}

pub async fn log_chat(state: &AppState, entry: ChatEntry) {
    let conversation_id = entry.conversation_id.clone();
    let result = blocking(state, move |db| {
        db.add_chat_message(&NewChatMessage {
            conversation_id: &entry.conversation_id,
            role: entry.role.as_db_str(),
            content: &entry.content,
            status: entry.status.as_str(),
            latency_ms: entry.latency_ms,
            scrubbed_count: entry.scrubbed_count,
            title: entry.title.as_deref(),
            model: entry.model.as_deref(),
        })
    })
    .await;

    if result.is_err() {
        warn!("Failed to log chat message for conversation {}", conversation_id);
    }
}

/// Move the newest message in `from` to `to`.
pub async fn mark_last_message(state: &AppState, conversation_id: &str, from: MessageStatus, to: MessageStatus) {
    let conv = conversation_id.to_string();
    match blocking(state, move |db| db.update_last_message_status(&conv, from.as_str(), to.as_str())).await {
        Ok(true) => debug!("Conversation {}: {} -> {}", conversation_id, from.as_str(), to.as_str()),
        Ok(false) => debug!("Conversation {} has no {} message", conversation_id, from.as_str()),
        Err(_) => warn!("Failed to update message status in {}", conversation_id),
    }
}

/// Prompt prefix replaying the conversation's latest turns. Uses what was
/// actually forwarded, so a redacted turn stays redacted.
pub async fn conversation_context(state: &AppState, conversation_id: Option<&str>) -> String {
    let Some(conv) = conversation_id else {
        return String::new();
    };
    let conv = conv.to_string();
    let rows = match blocking(state, move |db| db.audit_logs_for_conversation(&conv, CONTEXT_TURNS as u32)).await {
        Ok(rows) => rows,
        Err(_) => {
            warn!("Could not load conversation context");
            return String::new();
        }
    };

    let turns: Vec<Turn<'_>> = rows
        .iter()
        .map(|row| Turn {
            payload: row.payload_redacted.as_ref().unwrap_or(&row.payload_raw),
            ai_output: row.metadata["ai_response"]
                .as_str()
                .or(row.ai_reasoning.as_deref()),
        })
        .collect();

    build_conversation_context(&turns)
}
