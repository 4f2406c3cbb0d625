use std::collections::BTreeSet;
use std::time::Instant;

use axum::{Extension, Json, extract::State};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use bento_db::models::NewAuditLog;
use bento_shield::RedactionMode;
use bento_shield::llm::DEFAULT_SYSTEM_INSTRUCTION;
use bento_shield::policy;
use bento_types::api::{InterceptMetadata, InterceptRequest, InterceptResponse, InterceptStatus};
use bento_types::models::{ChatRole, MessageStatus, PolicyConfig, PrivacyReceipt, Verdict};

use crate::audit::{self, ChatEntry};
use crate::error::ApiError;
use crate::middleware::{Identity, RequestId};
use crate::pending::PendingInterception;
use crate::state::{AppState, blocking};

pub const SENSE_ENGINE: &str = "Bento SENSE (Llama 3)";
pub const DEFAULT_POLICY_ID: &str = "personal-default-v1";
pub const DEFAULT_MODEL_LABEL: &str = "Gemini 3 Flash";
const PASS_THROUGH_PROVIDER: &str = "gemini";

pub(crate) fn latency_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

/// Text the user typed, or the whole payload as JSON.
fn prompt_of(payload: &Value) -> String {
    ["input", "message", "prompt"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

/// Audit metadata: the caller's metadata plus what the gateway adds.
pub(crate) fn audit_metadata(meta: Option<&InterceptMetadata>) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(meta) = meta {
        out.extend(meta.extra.clone());
        if let Some(conv) = &meta.conversation_id {
            out.insert("conversation_id".into(), json!(conv));
        }
    }
    out
}

/// Profile config for the caller, overlaid with the request's own config.
/// Anonymous callers start from everything-enabled; an authenticated caller
/// whose profile cannot be loaded gets the fail-secure default.
async fn resolve_policy(state: &AppState, identity: &Identity, req: &InterceptRequest) -> PolicyConfig {
    let base = match identity.claims() {
        None => PolicyConfig::default(),
        Some(claims) => {
            let user_id = claims.sub.to_string();
            let wanted = req.policy_id.clone();
            let found = blocking(state, move |db| {
                let chosen = match wanted {
                    Some(pid) => db.get_profile(&user_id, &pid)?,
                    None => None,
                };
                match chosen {
                    Some(profile) => Ok(Some(profile)),
                    None => db.get_active_profile(&user_id),
                }
            })
            .await;

            match found {
                Ok(Some(p)) => policy::config_for_profile(&p.id, &p.name, &p.toggles, &p.custom_keywords),
                Ok(None) => policy::default_config(),
                Err(_) => {
                    warn!("Profile lookup failed, using fail-secure default policy");
                    policy::default_config()
                }
            }
        }
    };

    policy::merge(req.policy_config.as_ref(), base)
}

pub async fn intercept(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(req): Json<InterceptRequest>,
) -> Result<Json<InterceptResponse>, ApiError> {
    let started = Instant::now();

    if !req.payload.is_object() {
        return Err(ApiError::bad_request("payload must be a JSON object"));
    }

    let config = resolve_policy(&state, &identity, &req).await;
    let conversation_id = req.metadata.as_ref().and_then(|m| m.conversation_id.clone());
    let prompt = prompt_of(&req.payload);

    let (redacted, hits) = state.redactor.redact_json(&req.payload, RedactionMode::Swap, &config);

    if !hits.is_empty() {
        let kinds: BTreeSet<&str> = hits.iter().map(|h| h.kind.as_str()).collect();
        let violation_details = format!("Detected: {}", kinds.into_iter().collect::<Vec<_>>().join(", "));

        if let Some(conv) = &conversation_id {
            let mut entry = ChatEntry::new(conv, ChatRole::User, prompt.clone(), MessageStatus::Warning);
            entry.title = Some(prompt.chars().take(50).collect());
            entry.model = Some(
                req.payload["model"]
                    .as_str()
                    .unwrap_or(DEFAULT_MODEL_LABEL)
                    .to_string(),
            );
            audit::log_chat(&state, entry).await;
        }

        let pending_id = state
            .pending
            .insert(PendingInterception {
                original: req.payload.clone(),
                redacted: redacted.clone(),
                hits: hits.clone(),
                policy_prompt: config.auditor_prompt.clone(),
                request_id: request_id.clone(),
                source: req.source.clone(),
                metadata: req.metadata.clone(),
            })
            .await;

        info!("Intercepted request {} ({}), pending {}", request_id, violation_details, pending_id);

        let mut resp = InterceptResponse::new(InterceptStatus::RequiresConfirmation);
        resp.pending_id = Some(pending_id);
        resp.violation_details = Some(violation_details);
        resp.redacted_payload = Some(redacted);
        resp.hits = Some(hits);
        return Ok(Json(resp));
    }

    let verdict = state.auditor.audit(&redacted, config.auditor_prompt.as_deref()).await;

    if let Some(conv) = &conversation_id {
        let mut entry = ChatEntry::new(conv, ChatRole::User, prompt.clone(), MessageStatus::Verified);
        entry.title = Some(prompt.chars().take(50).collect());
        audit::log_chat(&state, entry).await;
    }

    // A rejected payload is never forwarded.
    let ai_response = if verdict.verdict == Verdict::Rejected {
        warn!("Request {} rejected by auditor, not forwarding", request_id);
        None
    } else {
        let context = audit::conversation_context(&state, conversation_id.as_deref()).await;
        let reply = state
            .llm
            .route(PASS_THROUGH_PROVIDER, &format!("{}{}", context, prompt), Some(DEFAULT_SYSTEM_INSTRUCTION))
            .await;
        Some(reply.text)
    };

    let latency = latency_ms(started);

    if let (Some(conv), Some(text)) = (&conversation_id, &ai_response) {
        let mut entry = ChatEntry::new(conv, ChatRole::Ai, text.clone(), MessageStatus::Verified);
        entry.latency_ms = latency;
        audit::log_chat(&state, entry).await;
    }

    let mut metadata = audit_metadata(req.metadata.as_ref());
    if let Some(text) = &ai_response {
        metadata.insert("ai_response".into(), json!(text));
    }
    audit::record(
        &state,
        NewAuditLog {
            payload_raw: req.payload.clone(),
            payload_redacted: Some(redacted.clone()),
            verdict: verdict.verdict,
            compliance_score: verdict.compliance_score,
            ai_reasoning: Some(verdict.reasoning.clone()),
            has_pii: false,
            source: req.source.clone(),
            request_id: Some(request_id),
            token_count: (req.payload.to_string().len() / 4) as i64,
            bypass_used: false,
            conversation_id: conversation_id.clone(),
            metadata: Value::Object(metadata),
        },
    )
    .await;

    let engine = match ai_response.as_deref() {
        Some(text) if !text.is_empty() => format!("{} + Gemini", SENSE_ENGINE),
        _ => SENSE_ENGINE.to_string(),
    };

    let mut resp = InterceptResponse::new(InterceptStatus::Ok);
    resp.redacted_payload = Some(redacted);
    resp.verdict = Some(verdict.verdict);
    resp.compliance_score = Some(verdict.compliance_score);
    resp.reasoning = Some(verdict.reasoning);
    resp.ai_response = ai_response;
    resp.receipt = Some(PrivacyReceipt {
        latency_ms: latency,
        engine,
        scrubbed_count: 0,
        policy_id: Some(req.policy_id.unwrap_or_else(|| DEFAULT_POLICY_ID.to_string())),
    });
    Ok(Json(resp))
}
