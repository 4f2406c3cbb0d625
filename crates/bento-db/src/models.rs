// Database row types. These map directly to SQLite rows and stay
// separate from the bento-types API models.
use bento_types::models::{ProfileToggles, Verdict};
use serde_json::Value;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub icon_name: String,
    pub color: String,
    pub description: String,
    pub is_active: bool,
    pub toggles: ProfileToggles,
    pub custom_keywords: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewProfile<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
    pub icon_name: &'a str,
    pub color: &'a str,
    pub description: &'a str,
    pub toggles: ProfileToggles,
    pub custom_keywords: &'a [String],
}

#[derive(Debug, Clone)]
pub struct AuditLogRow {
    pub id: String,
    pub created_at: String,
    pub payload_raw: Value,
    pub payload_redacted: Option<Value>,
    pub verdict: String,
    pub compliance_score: f64,
    pub ai_reasoning: Option<String>,
    pub has_pii: bool,
    pub source: String,
    pub request_id: Option<String>,
    pub token_count: i64,
    pub bypass_used: bool,
    pub conversation_id: Option<String>,
    pub metadata: Value,
}

pub struct NewAuditLog {
    pub payload_raw: Value,
    pub payload_redacted: Option<Value>,
    pub verdict: Verdict,
    pub compliance_score: f64,
    pub ai_reasoning: Option<String>,
    pub has_pii: bool,
    pub source: String,
    pub request_id: Option<String>,
    pub token_count: i64,
    pub bypass_used: bool,
    pub conversation_id: Option<String>,
    pub metadata: Value,
}

/// Aggregate counts over a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditCounts {
    pub total: u64,
    pub with_pii: u64,
    pub violations: u64,
}

pub struct ConversationRow {
    pub id: String,
    pub title: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub status: String,
    pub latency_ms: f64,
    pub scrubbed_count: i64,
    pub created_at: String,
}

pub struct NewChatMessage<'a> {
    pub conversation_id: &'a str,
    pub role: &'a str,
    pub content: &'a str,
    pub status: &'a str,
    pub latency_ms: f64,
    pub scrubbed_count: i64,
    /// Used only when the conversation is created by this message.
    pub title: Option<&'a str>,
    pub model: Option<&'a str>,
}
