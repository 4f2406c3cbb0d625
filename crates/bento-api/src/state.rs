use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tracing::error;

use bento_db::Database;
use bento_gateway::Dispatcher;
use bento_shield::{Auditor, LlmRouter, Redactor};

use crate::pending::PendingStore;
use crate::rate_limit::{DEFAULT_LIMIT, DEFAULT_WINDOW, RateLimiter};

pub type AppState = Arc<AppStateInner>;

/// Settings the handlers need at request time.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    /// Shared key expected in `X-Bento-Secret-Key`. `None` leaves the
    /// key-protected routes open.
    pub secret_key: Option<String>,
    pub environment: String,
    pub version: String,
    pub pending_ttl: Duration,
    /// Requests allowed per caller and route in each `rate_window`.
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl ApiConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            secret_key: None,
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            pending_ttl: Duration::from_secs(300),
            rate_limit: DEFAULT_LIMIT,
            rate_window: DEFAULT_WINDOW,
        }
    }
}

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub redactor: Redactor,
    pub auditor: Auditor,
    pub llm: LlmRouter,
    pub pending: PendingStore,
    pub limiter: RateLimiter,
    pub config: ApiConfig,
}

impl AppStateInner {
    pub fn new(db: Database, auditor: Auditor, llm: LlmRouter, config: ApiConfig) -> AppState {
        Arc::new(Self {
            db,
            dispatcher: Dispatcher::new(),
            redactor: Redactor::new(),
            auditor,
            llm,
            pending: PendingStore::new(config.pending_ttl),
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            config,
        })
    }
}

/// Run a database closure on the blocking pool.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
