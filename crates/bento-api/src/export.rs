use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, info};

use bento_db::models::AuditLogRow;

use crate::state::{AppState, blocking};

const EXPORT_LIMIT: u32 = 1000;
const INR_PER_TOKEN: f64 = 830.0 / 1_000_000.0;

pub const CSV_HEADER: [&str; 8] = [
    "Log ID",
    "Timestamp",
    "Source",
    "Verdict",
    "PII Detected",
    "Has Violation",
    "Token Count",
    "Est. Cost (INR)",
];

fn yes_no(flag: bool) -> &'static str {
    if flag { "YES" } else { "NO" }
}

/// Render audit rows, newest first, as CSV.
pub fn render_csv(rows: &[AuditLogRow]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for row in rows {
        let tokens = row.token_count.max(0);
        let token_count = tokens.to_string();
        let cost = format!("₹{:.4}", tokens as f64 * INR_PER_TOKEN);
        writer.write_record([
            row.id.as_str(),
            row.created_at.as_str(),
            row.source.as_str(),
            row.verdict.as_str(),
            yes_no(row.has_pii),
            yes_no(row.verdict != "VALID"),
            token_count.as_str(),
            cost.as_str(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e.error()))
}

pub async fn audit_csv(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = blocking(&state, |db| db.recent_audit_logs(EXPORT_LIMIT)).await?;

    let body = render_csv(&rows).map_err(|e| {
        error!("CSV export failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let filename = format!("bento_audit_log_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
    info!("Exported {} audit log rows", rows.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={}", filename)),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, verdict: &str, has_pii: bool, tokens: i64) -> AuditLogRow {
        AuditLogRow {
            id: id.into(),
            created_at: "2026-10-18T10:00:00.000000Z".into(),
            payload_raw: json!({}),
            payload_redacted: None,
            verdict: verdict.into(),
            compliance_score: 1.0,
            ai_reasoning: None,
            has_pii,
            source: "api-gateway".into(),
            request_id: None,
            token_count: tokens,
            bypass_used: false,
            conversation_id: None,
            metadata: json!({}),
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_log() {
        let bytes = render_csv(&[row("a", "VALID", false, 1000), row("b", "FLAGGED", true, 0)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "Log ID,Timestamp,Source,Verdict,PII Detected,Has Violation,Token Count,Est. Cost (INR)"
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "a,2026-10-18T10:00:00.000000Z,api-gateway,VALID,NO,NO,1000,₹0.8300");
        assert_eq!(lines[2], "b,2026-10-18T10:00:00.000000Z,api-gateway,FLAGGED,YES,YES,0,₹0.0000");
    }
}
