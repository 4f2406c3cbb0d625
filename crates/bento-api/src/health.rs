use std::time::Instant;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use bento_types::api::{ComponentCheck, HealthChecks, HealthResponse};

use crate::state::{AppState, blocking};

async fn check_database(state: &AppState) -> ComponentCheck {
    let started = Instant::now();
    match blocking(state, |db| db.ping()).await {
        Ok(()) => ComponentCheck {
            status: "healthy".to_string(),
            latency_ms: Some((started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0),
            message: Some("Database connection successful".to_string()),
            error: None,
        },
        Err(status) => {
            warn!("Database health check failed: {}", status);
            ComponentCheck {
                status: "unhealthy".to_string(),
                latency_ms: None,
                message: Some("Database connection failed".to_string()),
                error: Some(status.to_string()),
            }
        }
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database(&state).await;
    let status = if database.status == "healthy" { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: state.config.version.clone(),
        environment: state.config.environment.clone(),
        checks: HealthChecks { database },
    })
}

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "Bento System Online",
        "status": "operational",
        "version": state.config.version,
        "environment": state.config.environment,
    }))
}

pub async fn live() -> impl IntoResponse {
    Json(json!({"status": "alive"}))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if check_database(&state).await.status == "healthy" {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not_ready", "reason": "database_unavailable"})),
        )
    }
}
