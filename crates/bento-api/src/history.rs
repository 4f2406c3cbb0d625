use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use bento_db::models::{AuditLogRow, ChatMessageRow, ConversationRow};
use bento_db::parse_timestamp;
use bento_shield::context::user_text;
use bento_types::api::{HistoryDetail, HistoryItem, HistoryMessage, HistoryQuery, StatusMessage};
use bento_types::models::{ChatRole, MessageStatus, Verdict};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

const TITLE_CHARS: usize = 40;
const PREVIEW_CHARS: usize = 100;
const FALLBACK_LOGS: u32 = 100;

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Dashboard label for a conversation, from its newest message.
fn conversation_status(last: Option<&ChatMessageRow>) -> &'static str {
    match last.map(|m| m.status.as_str()) {
        Some("warning") => "Flagged",
        Some("canceled") => "Canceled",
        Some("insecure") => "Insecure",
        _ => "Completed",
    }
}

fn summarize(conv: ConversationRow, messages: &[&ChatMessageRow]) -> HistoryItem {
    let first_user = messages.iter().find(|m| m.role == "user");
    let (title, preview) = match first_user {
        Some(m) => (truncate(&m.content, TITLE_CHARS), truncate(&m.content, PREVIEW_CHARS)),
        None => ("New Conversation".to_string(), String::new()),
    };

    let status = conversation_status(messages.last().copied());
    let verdict_color = match status {
        "Flagged" | "Canceled" | "Insecure" => "text-red-400",
        _ => "text-emerald-400",
    };

    HistoryItem {
        id: conv.id,
        title,
        preview,
        date: parse_timestamp(&conv.updated_at).unwrap_or_else(Utc::now),
        model: conv.model,
        status: status.to_string(),
        verdict_color: verdict_color.to_string(),
    }
}

fn chat_message(row: &ChatMessageRow) -> HistoryMessage {
    HistoryMessage {
        role: ChatRole::from_db_str(&row.role),
        content: row.content.clone(),
        timestamp: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
        status: row.status.parse().unwrap_or(MessageStatus::Verified),
    }
}

/// Rebuild a transcript from audit logs for conversations that predate the chat log.
fn messages_from_logs(logs: &[AuditLogRow]) -> Vec<HistoryMessage> {
    let mut out = Vec::new();
    for log in logs {
        let timestamp = parse_timestamp(&log.created_at).unwrap_or_else(Utc::now);
        let flagged = log.verdict == Verdict::Flagged.as_str();

        out.push(HistoryMessage {
            role: ChatRole::User,
            content: user_text(&log.payload_raw).unwrap_or("Unknown").to_string(),
            timestamp,
            status: if flagged { MessageStatus::Warning } else { MessageStatus::Verified },
        });

        let reply = log.metadata["ai_response"]
            .as_str()
            .or(log.ai_reasoning.as_deref())
            .filter(|s| !s.is_empty());
        if let Some(reply) = reply {
            out.push(HistoryMessage {
                role: ChatRole::Ai,
                content: reply.to_string(),
                timestamp,
                status: MessageStatus::Verified,
            });
        }
    }
    out
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.clamp(1, 200);

    let (conversations, messages) = blocking(&state, move |db| {
        let conversations = db.list_conversations(limit)?;
        let ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();
        let messages = db.get_messages_for_conversations(&ids)?;
        Ok((conversations, messages))
    })
    .await?;

    let mut by_conversation: HashMap<&str, Vec<&ChatMessageRow>> = HashMap::new();
    for m in &messages {
        by_conversation.entry(m.conversation_id.as_str()).or_default().push(m);
    }

    let items: Vec<HistoryItem> = conversations
        .into_iter()
        .map(|conv| {
            let msgs = by_conversation.get(conv.id.as_str()).cloned().unwrap_or_default();
            summarize(conv, &msgs)
        })
        .collect();

    Ok(Json(items))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let messages = blocking(&state, move |db| {
        let chat = db.get_chat_messages(&lookup)?;
        if !chat.is_empty() {
            return Ok(chat.iter().map(chat_message).collect::<Vec<_>>());
        }

        let logs = db.audit_logs_for_conversation(&lookup, FALLBACK_LOGS)?;
        if !logs.is_empty() {
            return Ok(messages_from_logs(&logs));
        }

        Ok(db
            .get_audit_log(&lookup)?
            .map(|log| messages_from_logs(std::slice::from_ref(&log)))
            .unwrap_or_default())
    })
    .await?;

    if messages.is_empty() {
        return Err(ApiError::not_found("Conversation not found"));
    }
    Ok(Json(HistoryDetail { id, messages }))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let target = id.clone();
    let (had_conversation, logs) = blocking(&state, move |db| {
        Ok((
            db.delete_conversation(&target)?,
            db.delete_audit_logs_for_conversation(&target)?,
        ))
    })
    .await?;

    info!(
        "Deleted conversation {} (existed: {}, audit logs: {})",
        id, had_conversation, logs
    );
    Ok(Json(StatusMessage {
        status: "success".to_string(),
        message: "Conversation deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(role: &str, content: &str, status: &str) -> ChatMessageRow {
        ChatMessageRow {
            id: "m".into(),
            conversation_id: "c".into(),
            role: role.into(),
            content: content.into(),
            status: status.into(),
            latency_ms: 0.0,
            scrubbed_count: 0,
            created_at: "2026-10-18T10:00:00.000000Z".into(),
        }
    }

    fn conv() -> ConversationRow {
        ConversationRow {
            id: "c".into(),
            title: "New Conversation".into(),
            model: "Gemini 3 Flash".into(),
            created_at: "2026-10-18T10:00:00.000000Z".into(),
            updated_at: "2026-10-18T10:05:00.000000Z".into(),
        }
    }

    #[test]
    fn summary_truncates_first_user_message() {
        let long = "x".repeat(120);
        let user = msg("user", &long, "verified");
        let ai = msg("assistant", "ok", "warning");
        let item = summarize(conv(), &[&user, &ai]);

        assert_eq!(item.title, format!("{}...", "x".repeat(40)));
        assert_eq!(item.preview, format!("{}...", "x".repeat(100)));
        assert_eq!(item.status, "Flagged");
        assert_eq!(item.verdict_color, "text-red-400");
    }

    #[test]
    fn empty_conversation_is_completed() {
        let item = summarize(conv(), &[]);
        assert_eq!(item.title, "New Conversation");
        assert_eq!(item.preview, "");
        assert_eq!(item.status, "Completed");
        assert_eq!(item.verdict_color, "text-emerald-400");
    }

    #[test]
    fn status_follows_last_message() {
        assert_eq!(conversation_status(Some(&msg("user", "a", "canceled"))), "Canceled");
        assert_eq!(conversation_status(Some(&msg("ai", "a", "insecure"))), "Insecure");
        assert_eq!(conversation_status(Some(&msg("ai", "a", "verified"))), "Completed");
    }

    #[test]
    fn logs_become_user_and_ai_turns() {
        let log = AuditLogRow {
            id: "l".into(),
            created_at: "2026-10-18T10:00:00.000000Z".into(),
            payload_raw: json!({"input": "hello"}),
            payload_redacted: None,
            verdict: "FLAGGED".into(),
            compliance_score: 0.2,
            ai_reasoning: Some("contains an email".into()),
            has_pii: true,
            source: "api-gateway".into(),
            request_id: None,
            token_count: 0,
            bypass_used: false,
            conversation_id: None,
            metadata: json!({}),
        };
        let out = messages_from_logs(&[log]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "hello");
        assert_eq!(out[0].status, MessageStatus::Warning);
        assert_eq!(out[1].role, ChatRole::Ai);
        assert_eq!(out[1].content, "contains an email");
    }
}
