//! Dashboard accounts. Profiles and analytics are scoped to the bearer
//! token issued here.

use std::ops::RangeInclusive;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use bento_db::models::UserRow;
use bento_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

const USERNAME_LEN: RangeInclusive<usize> = 3..=32;
const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_LIFETIME_DAYS: i64 = 30;

fn bad_login() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "Incorrect username or password")
}

fn internal(what: &str, e: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", what, e);
    ApiError::from(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Returns the username to store.
fn validate_registration(req: &RegisterRequest) -> Result<String, ApiError> {
    let username = req.username.trim();
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(ApiError::bad_request("Username must be 3 to 32 characters"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }
    Ok(username.to_string())
}

/// Argon2id PHC string for `password`.
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| internal("Password hashing failed", e))
}

/// A stored hash that does not parse never matches.
fn password_matches(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Unreadable password hash in users table: {}", e);
            false
        }
    }
}

/// HS256 bearer token for `user_id`.
pub fn issue_token(secret: &str, user_id: Uuid, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| internal("Token signing failed", e))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validate_registration(&req)?;
    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let name = username.clone();
    let created = blocking(&state, move |db| {
        if db.get_user_by_username(&name)?.is_some() {
            return Ok(false);
        }
        db.create_user(&user_id.to_string(), &name, &password_hash)?;
        Ok(true)
    })
    .await?;

    if !created {
        return Err(ApiError::new(StatusCode::CONFLICT, "Username already registered"));
    }

    let token = issue_token(&state.config.jwt_secret, user_id, &username)?;
    info!("Registered dashboard user {}", username);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let username = req.username.trim().to_string();
    let user: UserRow = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(bad_login)?;

    if !password_matches(&req.password, &user.password) {
        warn!("Failed login for {}", user.username);
        return Err(bad_login());
    }

    let user_id: Uuid = user.id.parse().map_err(|e| internal("Stored user id is not a UUID", e))?;
    let token = issue_token(&state.config.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}
