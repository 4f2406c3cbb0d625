//! Fixed-window request limits per caller and route.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use bento_types::api::ErrorBody;

use crate::state::AppState;

pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one hit for `key`. Over the limit, returns how long until the
    /// window resets.
    pub async fn hit(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_string()).or_insert(Window { started: now, count: 0 });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.limit {
            return Err(self.window.saturating_sub(now.duration_since(window.started)));
        }
        window.count += 1;
        Ok(())
    }

    /// Forget windows that have already closed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before - windows.len()
    }
}

fn client_addr(req: &Request) -> String {
    forwarded_for(req.headers())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip().to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// Refuse callers that exceed the configured hits per window on a route.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let key = format!("{}:{}", client_addr(&req), route);

    match state.limiter.hit(&key).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            warn!("Rate limit exceeded for {}", key);
            let mut res = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody {
                    detail: "Too Many Requests".to_string(),
                }),
            )
                .into_response();
            let secs = retry_after.as_secs_f64().ceil() as u64;
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            res
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_past_the_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.hit("10.0.0.1:/api/v1/intercept").await.is_ok());
        }
        let retry = limiter.hit("10.0.0.1:/api/v1/intercept").await.unwrap_err();
        assert!(retry <= Duration::from_secs(60));

        assert!(limiter.hit("10.0.0.2:/api/v1/intercept").await.is_ok());
        assert!(limiter.hit("10.0.0.1:/api/v1/profiles").await.is_ok());
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        assert!(limiter.hit("k").await.is_ok());
        assert!(limiter.hit("k").await.is_ok());
        assert_eq!(limiter.sweep().await, 1);
    }

    #[test]
    fn first_forwarded_address_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(forwarded_for(&headers).as_deref(), Some("203.0.113.7"));
        assert!(forwarded_for(&HeaderMap::new()).is_none());
    }
}
