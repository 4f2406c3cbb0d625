mod config;

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use bento_api::middleware::{PROCESS_TIME_HEADER, REQUEST_ID_HEADER, SECRET_KEY_HEADER};
use bento_api::{ApiConfig, AppStateInner};
use bento_db::Database;
use bento_shield::{Auditor, LlmRouter};

use crate::config::Config;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bento=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.has_placeholder_secret() {
        if config.is_production() {
            eprintln!("FATAL: BENTO_JWT_SECRET is unset or still a placeholder.");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
        warn!("BENTO_JWT_SECRET is a placeholder; tokens are forgeable outside development");
    }
    if config.secret_key.is_none() {
        warn!("BENTO_SECRET_KEY not set, gateway routes are open");
    }

    // Init database
    let db = if config.db_path.to_str() == Some(":memory:") {
        Database::open_in_memory()?
    } else {
        Database::open(&config.db_path)?
    };

    let api_config = ApiConfig {
        jwt_secret: config.jwt_secret.clone(),
        secret_key: config.secret_key.clone(),
        environment: config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_ttl: config.pending_ttl,
        rate_limit: config.rate_limit,
        rate_window: config.rate_window,
    };
    let state = AppStateInner::new(
        db,
        Auditor::new(config.groq_api_key.clone()),
        LlmRouter::new(config.gemini_api_key.clone()),
        api_config,
    );

    // Drop expired interceptions and rate-limit windows every minute
    let sweeper = tokio::spawn(bento_api::pending::run_sweeper(state.clone(), SWEEP_INTERVAL));

    let allow_origin = if config.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, HeaderName::from_static(SECRET_KEY_HEADER)])
        .expose_headers([
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(PROCESS_TIME_HEADER),
        ])
        .allow_credentials(false);

    let app = bento_api::router(state)
        .layer(DefaultBodyLimit::max(config.max_payload_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Bento gateway listening on {} ({})", addr, config.environment);
    info!(
        "Body limit {} bytes, request timeout {:?}, pending TTL {:?}",
        config.max_payload_bytes, config.request_timeout, config.pending_ttl
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Bento gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
