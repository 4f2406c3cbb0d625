use std::time::Instant;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;
use uuid::Uuid;

use bento_types::api::{Claims, ErrorBody};

use crate::state::AppState;

pub const SECRET_KEY_HEADER: &str = "x-bento-secret-key";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Who is calling, when a valid bearer token was supplied.
#[derive(Debug, Clone, Default)]
pub struct Identity(pub Option<Claims>);

impl Identity {
    pub fn claims(&self) -> Option<&Claims> {
        self.0.as_ref()
    }
}

/// Per-request id, also echoed in `X-Request-ID`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn decode_bearer(headers: &HeaderMap, secret: &str) -> Result<Claims, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(token_data.claims)
}

fn api_key_ok(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(SECRET_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| given == expected)
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            detail: "Could not validate credentials".to_string(),
        }),
    )
        .into_response()
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = decode_bearer(req.headers(), &state.config.jwt_secret)?;
    req.extensions_mut().insert(Identity(Some(claims.clone())));
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Check `X-Bento-Secret-Key`. Open when no key is configured.
pub async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !api_key_ok(req.headers(), state.config.secret_key.as_deref()) {
        warn!("Rejected request with missing or wrong API key");
        return forbidden();
    }
    next.run(req).await
}

/// Accept either a bearer token or the shared API key.
pub async fn require_any_credential(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if decode_bearer(req.headers(), &state.config.jwt_secret).is_ok()
        || api_key_ok(req.headers(), state.config.secret_key.as_deref())
    {
        return next.run(req).await;
    }
    forbidden()
}

/// Attach an `Identity` from an optional bearer token. Never rejects.
pub async fn identify(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = decode_bearer(req.headers(), &state.config.jwt_secret).ok();
    req.extensions_mut().insert(Identity(claims));
    next.run(req).await
}

/// Tag every request with an id and report how long it took.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    let started = Instant::now();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;

    let elapsed = started.elapsed();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    let millis = elapsed.as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}ms", millis)) {
        headers.insert(PROCESS_TIME_HEADER, value);
    }
    if elapsed.as_secs_f64() > 1.0 {
        warn!("Slow request {} {} took {:.2}ms", id, path, millis);
    }

    response
}
