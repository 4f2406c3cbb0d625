use axum::{Json, extract::State};
use serde_json::json;
use tracing::info;

use bento_db::models::NewAuditLog;
use bento_types::api::{CancelRequest, StatusMessage};
use bento_types::models::{MessageStatus, Verdict};

use crate::audit;
use crate::state::AppState;

/// Record that the user aborted an interception. Always succeeds; the
/// pending entry may already be gone.
pub async fn cancel(
    State(state): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Json<StatusMessage> {
    if let Some(conv) = &req.conversation_id {
        audit::mark_last_message(&state, conv, MessageStatus::Warning, MessageStatus::Canceled).await;
    }

    let was_pending = state.pending.remove(&req.pending_id).await;
    info!("Pending {} cancelled (still pending: {})", req.pending_id, was_pending);

    audit::record(
        &state,
        NewAuditLog {
            payload_raw: json!({"event": "user_aborted"}),
            payload_redacted: None,
            verdict: Verdict::Canceled,
            compliance_score: 0.0,
            ai_reasoning: Some("User manually canceled the request during intervention.".to_string()),
            has_pii: true,
            source: "web-dashboard".to_string(),
            request_id: None,
            token_count: 0,
            bypass_used: false,
            conversation_id: req.conversation_id.clone(),
            metadata: json!({
                "related_pending_id": req.pending_id,
                "conversation_id": req.conversation_id,
                "source": "web-dashboard",
            }),
        },
    )
    .await;

    Json(StatusMessage {
        status: "success".to_string(),
        message: "Cancellation logged and conversation preserved".to_string(),
    })
}
