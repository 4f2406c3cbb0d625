pub mod analytics;
pub mod audit;
pub mod auth;
pub mod cancel;
pub mod confirm;
pub mod error;
pub mod export;
pub mod health;
pub mod history;
pub mod intercept;
pub mod middleware;
pub mod pending;
pub mod profiles;
pub mod rate_limit;
pub mod scan;
pub mod state;

use std::net::SocketAddr;

use axum::{
    Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{ApiConfig, AppState, AppStateInner};

use crate::middleware::{identify, request_id, require_any_credential, require_api_key, require_auth};
use crate::rate_limit::rate_limit;

/// Every route the gateway serves, without transport layers (CORS, tracing,
/// limits), which the binary adds.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(health::root))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health::health))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/api/v1/realtime", get(realtime));

    let profile_routes = Router::new()
        .route("/api/v1/profiles/status", get(profiles::status))
        .route("/api/v1/profiles", get(profiles::list).post(profiles::create))
        .route(
            "/api/v1/profiles/{profile_id}",
            get(profiles::get).patch(profiles::update).delete(profiles::delete),
        )
        .route("/api/v1/profiles/{profile_id}/activate", post(profiles::activate))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    let keyed_routes = Router::new()
        .route("/api/v1/intercept", post(intercept::intercept))
        .route("/api/v1/intercept/confirm", post(confirm::confirm))
        .route("/api/v1/intercept/cancel", post(cancel::cancel))
        .route("/api/v1/cancel", post(cancel::cancel))
        .route("/api/v1/history", get(history::list))
        .route("/api/v1/history/{id}", get(history::detail).delete(history::delete))
        .route("/api/v1/export/audit-csv", get(export::audit_csv))
        .route("/api/v1/scan", post(scan::scan))
        .route_layer(from_fn_with_state(state.clone(), require_api_key))
        .route_layer(from_fn_with_state(state.clone(), identify))
        .route_layer(from_fn_with_state(state.clone(), rate_limit));

    let analytics_routes = Router::new()
        .route("/api/v1/analytics", get(analytics::analytics))
        .route_layer(from_fn_with_state(state.clone(), require_any_credential));

    Router::new()
        .merge(public)
        .merge(profile_routes)
        .merge(keyed_routes)
        .merge(analytics_routes)
        .layer(from_fn(request_id))
        .with_state(state)
}

async fn realtime(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| bento_gateway::handle_connection(socket, dispatcher, peer.to_string()))
}
