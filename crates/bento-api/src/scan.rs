use axum::{Json, extract::State};

use bento_shield::RedactionMode;
use bento_types::api::{ScanRequest, ScanResponse};
use bento_types::models::PolicyConfig;

use crate::state::AppState;

/// Redact free text with every detector on. Nothing is stored.
pub async fn scan(State(state): State<AppState>, Json(req): Json<ScanRequest>) -> Json<ScanResponse> {
    let (redacted, _hits) =
        state
            .redactor
            .redact_text(&req.text, RedactionMode::Redact, &PolicyConfig::default());
    let has_pii = redacted != req.text;
    Json(ScanResponse {
        original: req.text,
        redacted,
        has_pii,
    })
}
