use std::time::Instant;

use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use bento_db::models::NewAuditLog;
use bento_shield::llm::DEFAULT_SYSTEM_INSTRUCTION;
use bento_types::api::{ConfirmRequest, InterceptResponse, InterceptStatus};
use bento_types::models::{ChatRole, Choice, MessageStatus, PrivacyReceipt, Verdict};

use crate::audit::{self, ChatEntry};
use crate::error::ApiError;
use crate::intercept::{DEFAULT_POLICY_ID, audit_metadata, latency_ms};
use crate::state::AppState;

const PROMPT_KEYS: &[&str] = &["user_query", "prompt", "text", "input", "message", "content"];

fn choice_label(choice: Choice) -> &'static str {
    match choice {
        Choice::Safe => "SAFE",
        Choice::Original => "ORIGINAL",
        Choice::Cancel => "CANCEL",
    }
}

/// Prompt to forward for a confirmed payload. Structured payloads without a
/// text field are sent whole.
fn forwarded_prompt(target: &Value) -> String {
    let data = target.get("payload").unwrap_or(target);

    let text = PROMPT_KEYS.iter().find_map(|key| match data.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Null) | Some(Value::String(_)) | None => None,
        Some(other) => Some(other.to_string()),
    });

    text.unwrap_or_else(|| {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        format!("Process the following structured data:\n{}", pretty)
    })
}

pub async fn confirm(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<InterceptResponse>, ApiError> {
    let started = Instant::now();

    let pending = state
        .pending
        .take(&req.pending_id)
        .await
        .ok_or_else(|| ApiError::not_found("Pending Request Not Found or Expired"))?;

    if req.choice == Choice::Cancel {
        info!("Pending {} cancelled by user", req.pending_id);
        let mut resp = InterceptResponse::new(InterceptStatus::Cancelled);
        resp.redacted_payload = Some(json!({}));
        resp.verdict = Some(Verdict::Canceled);
        resp.compliance_score = Some(0.0);
        resp.reasoning = Some("User cancelled the request.".to_string());
        return Ok(Json(resp));
    }

    let bypass = req.choice == Choice::Original;
    let target = if bypass { pending.original.clone() } else { pending.redacted.clone() };
    let conversation_id = pending.metadata.as_ref().and_then(|m| m.conversation_id.clone());

    let context = audit::conversation_context(&state, conversation_id.as_deref()).await;
    let prompt = forwarded_prompt(&target);
    let reply = state
        .llm
        .route(&req.llm_provider, &format!("{}{}", context, prompt), Some(DEFAULT_SYSTEM_INSTRUCTION))
        .await;

    let verdict = state.auditor.audit(&target, pending.policy_prompt.as_deref()).await;
    let latency = latency_ms(started);
    let scrubbed = if bypass { 0 } else { pending.hits.len() };

    if let Some(conv) = &conversation_id {
        let status = if bypass { MessageStatus::Insecure } else { MessageStatus::Verified };
        audit::mark_last_message(&state, conv, MessageStatus::Warning, status).await;

        if !reply.text.is_empty() {
            let mut entry = ChatEntry::new(conv, ChatRole::Ai, reply.text.clone(), status);
            entry.latency_ms = latency;
            entry.scrubbed_count = scrubbed as i64;
            audit::log_chat(&state, entry).await;
        }
    }

    let mut metadata = audit_metadata(pending.metadata.as_ref());
    metadata.insert("related_pending_id".into(), json!(req.pending_id));
    metadata.insert("ai_response".into(), json!(reply.text));
    audit::record(
        &state,
        NewAuditLog {
            payload_raw: pending.original,
            payload_redacted: Some(target.clone()),
            verdict: verdict.verdict,
            compliance_score: verdict.compliance_score,
            ai_reasoning: Some(verdict.reasoning),
            has_pii: true,
            source: pending.source,
            request_id: Some(pending.request_id),
            token_count: reply.usage as i64,
            bypass_used: bypass,
            conversation_id,
            metadata: Value::Object(metadata),
        },
    )
    .await;

    info!(
        "Pending {} resolved with {} via {}",
        req.pending_id,
        choice_label(req.choice),
        req.llm_provider
    );

    let mut resp = InterceptResponse::new(InterceptStatus::Ok);
    resp.redacted_payload = Some(target);
    resp.verdict = Some(verdict.verdict);
    resp.compliance_score = Some(verdict.compliance_score);
    resp.reasoning = Some(format!(
        "User Choice: {}. Security Event logged.",
        choice_label(req.choice)
    ));
    resp.ai_response = Some(reply.text);
    resp.receipt = Some(PrivacyReceipt {
        latency_ms: latency,
        engine: req.llm_provider,
        scrubbed_count: scrubbed,
        policy_id: Some(DEFAULT_POLICY_ID.to_string()),
    });
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_uses_first_text_field() {
        assert_eq!(forwarded_prompt(&json!({"input": "hello", "model": "m"})), "hello");
        assert_eq!(forwarded_prompt(&json!({"payload": {"user_query": "q"}})), "q");
        assert_eq!(forwarded_prompt(&json!({"content": 42})), "42");
    }

    #[test]
    fn structured_payload_is_sent_whole() {
        let prompt = forwarded_prompt(&json!({"rows": [1, 2]}));
        assert!(prompt.starts_with("Process the following structured data:\n{"));
        assert!(prompt.contains("\"rows\""));
    }
}
