use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use bento_db::models::AuditLogRow;
use bento_db::{parse_timestamp, timestamp};
use bento_types::api::{AnalyticsQuery, AnalyticsResponse, RecentAlert, StatCard, TrafficPoint};
use bento_types::models::Verdict;

use crate::state::{AppState, blocking};

/// INR per million tokens.
const INR_PER_MILLION_TOKENS: f64 = 830.0;
const CHART_POINTS: usize = 7;
const RECENT_ALERTS: u32 = 5;

/// Time window, history fetch limit and chart bucket format for a range.
fn window(range: &str) -> (Duration, u32, &'static str) {
    match range {
        "1h" => (Duration::hours(1), 200, "%H:%M"),
        "7d" => (Duration::days(7), 500, "%Y-%m-%d"),
        "30d" => (Duration::days(30), 500, "%Y-%m-%d"),
        _ => (Duration::hours(24), 200, "%H:00"),
    }
}

/// Share of clean inspections, minus 10 points per bypass. 100 with no data.
pub fn safety_score(total: u64, violations: u64, bypasses: u64) -> u32 {
    if total == 0 {
        return 100;
    }
    let base = (total.saturating_sub(violations) as f64 / total as f64) * 100.0;
    (base - 10.0 * bypasses as f64).max(0.0) as u32
}

/// Bucket rows by formatted timestamp, keeping the latest buckets.
pub fn traffic_chart(rows: &[AuditLogRow], bucket_format: &str) -> Vec<TrafficPoint> {
    let mut buckets: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let Some(at) = parse_timestamp(&row.created_at) else {
            continue;
        };
        let entry = buckets.entry(at.format(bucket_format).to_string()).or_default();
        entry.0 += 1;
        if row.verdict != Verdict::Valid.as_str() {
            entry.1 += 1;
        }
    }

    if buckets.is_empty() {
        return vec![TrafficPoint {
            name: "No Data".to_string(),
            requests: 0,
            blocked: 0,
        }];
    }

    let skip = buckets.len().saturating_sub(CHART_POINTS);
    buckets
        .into_iter()
        .skip(skip)
        .map(|(name, (requests, blocked))| TrafficPoint { name, requests, blocked })
        .collect()
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_inr(amount: f64) -> String {
    let cents = (amount.max(0.0) * 100.0).round() as u64;
    format!("₹{}.{:02}", group_thousands(cents / 100), cents % 100)
}

fn stat(title: &str, value: String, trend: &str, color: &str) -> StatCard {
    StatCard {
        title: title.to_string(),
        value,
        change: "--".to_string(),
        trend: trend.to_string(),
        color: color.to_string(),
    }
}

pub async fn analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let (span, limit, bucket_format) = window(&query.range);
    let since = timestamp(Utc::now() - span);

    let (counts, recent, history) = blocking(&state, move |db| {
        Ok((
            db.count_audit_logs_since(&since)?,
            db.recent_audit_logs(RECENT_ALERTS)?,
            db.audit_logs_since(&since, limit)?,
        ))
    })
    .await?;

    let bypasses = history.iter().filter(|r| r.bypass_used).count() as u64;
    let tokens: u64 = history.iter().map(|r| r.token_count.max(0) as u64).sum();
    let cost = tokens as f64 / 1_000_000.0 * INR_PER_MILLION_TOKENS;

    let recent_alerts = recent
        .into_iter()
        .filter_map(|row| {
            Some(RecentAlert {
                id: row.id.parse::<Uuid>().ok()?,
                kind: "Data Scan".to_string(),
                source: row.metadata["source"]
                    .as_str()
                    .unwrap_or(if row.source.is_empty() { "API" } else { &row.source })
                    .to_string(),
                time: parse_timestamp(&row.created_at)?,
                status: row.verdict.parse::<Verdict>().ok()?,
            })
        })
        .collect();

    Ok(Json(AnalyticsResponse {
        safety_score: safety_score(counts.total, counts.violations, bypasses),
        stats: vec![
            stat("Total Inspections", group_thousands(counts.total), "neutral", "text-sky-400"),
            stat("Tokens Processed", group_thousands(tokens), "up", "text-amber-400"),
            stat("Est. Cost (INR)", format_inr(cost), "neutral", "text-emerald-400"),
            stat("PII Detected", group_thousands(counts.with_pii), "neutral", "text-violet-400"),
        ],
        recent_alerts,
        traffic_chart: traffic_chart(&history, bucket_format),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(created_at: &str, verdict: &str) -> AuditLogRow {
        AuditLogRow {
            id: Uuid::new_v4().to_string(),
            created_at: created_at.to_string(),
            payload_raw: json!({}),
            payload_redacted: None,
            verdict: verdict.to_string(),
            compliance_score: 1.0,
            ai_reasoning: None,
            has_pii: false,
            source: "api-gateway".to_string(),
            request_id: None,
            token_count: 0,
            bypass_used: false,
            conversation_id: None,
            metadata: json!({}),
        }
    }

    #[test]
    fn safety_score_penalises_violations_and_bypasses() {
        assert_eq!(safety_score(0, 0, 3), 100);
        assert_eq!(safety_score(10, 0, 0), 100);
        assert_eq!(safety_score(10, 2, 0), 80);
        assert_eq!(safety_score(10, 2, 1), 70);
        assert_eq!(safety_score(4, 1, 20), 0);
    }

    #[test]
    fn chart_buckets_by_hour_and_counts_blocked() {
        let rows = vec![
            row("2026-10-18T09:05:00.000000Z", "VALID"),
            row("2026-10-18T09:45:00.000000Z", "FLAGGED"),
            row("2026-10-18T11:00:00.000000Z", "CANCELED"),
        ];
        let chart = traffic_chart(&rows, "%H:00");
        assert_eq!(
            chart,
            vec![
                TrafficPoint { name: "09:00".into(), requests: 2, blocked: 1 },
                TrafficPoint { name: "11:00".into(), requests: 1, blocked: 1 },
            ]
        );
    }

    #[test]
    fn chart_keeps_latest_seven_buckets() {
        let rows: Vec<AuditLogRow> = (1..=9)
            .map(|d| row(&format!("2026-10-{:02}T00:00:00.000000Z", d), "VALID"))
            .collect();
        let chart = traffic_chart(&rows, "%Y-%m-%d");
        assert_eq!(chart.len(), 7);
        assert_eq!(chart[0].name, "2026-10-03");
        assert_eq!(chart[6].name, "2026-10-09");
    }

    #[test]
    fn empty_chart_has_placeholder() {
        let chart = traffic_chart(&[], "%H:%M");
        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].name, "No Data");
    }

    #[test]
    fn formats_numbers_like_the_dashboard() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(format_inr(0.0), "₹0.00");
        assert_eq!(format_inr(1234.5), "₹1,234.50");
    }

    #[test]
    fn unknown_range_falls_back_to_a_day() {
        let (span, limit, fmt) = window("banana");
        assert_eq!(span, Duration::hours(24));
        assert_eq!(limit, 200);
        assert_eq!(fmt, "%H:00");
    }
}
