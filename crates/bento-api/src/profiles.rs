use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use bento_db::models::{NewProfile, ProfileRow};
use bento_db::parse_timestamp;
use bento_types::api::{
    Claims, ProfileCreateRequest, ProfileResponse, ProfileStatusResponse, ProfileUpdateRequest,
};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

fn to_response(row: ProfileRow) -> Result<ProfileResponse, StatusCode> {
    let parse_id = |raw: &str| {
        raw.parse::<Uuid>().map_err(|e| {
            error!("Corrupt profile id {}: {}", raw, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    };
    let parse_time = |raw: &str| {
        parse_timestamp(raw).ok_or_else(|| {
            error!("Corrupt profile timestamp {}", raw);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    };

    Ok(ProfileResponse {
        id: parse_id(&row.id)?,
        user_id: parse_id(&row.user_id)?,
        created_at: parse_time(&row.created_at)?,
        updated_at: parse_time(&row.updated_at)?,
        name: row.name,
        icon_name: row.icon_name,
        color: row.color,
        description: row.description,
        is_active: row.is_active,
        redact_email: row.toggles.email,
        redact_phone: row.toggles.phone,
        redact_names: row.toggles.names,
        redact_payment: row.toggles.payment,
        redact_location: row.toggles.location,
        redact_credentials: row.toggles.credentials,
        custom_keywords: row.custom_keywords,
    })
}

fn to_responses(rows: Vec<ProfileRow>) -> Result<Vec<ProfileResponse>, StatusCode> {
    rows.into_iter().map(to_response).collect()
}

pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub.to_string();
    let profiles = to_responses(blocking(&state, move |db| db.list_profiles(&user_id)).await?)?;

    let active_profile_id = profiles.iter().find(|p| p.is_active).map(|p| p.id);
    Ok(Json(ProfileStatusResponse {
        setup_required: profiles.is_empty(),
        profiles,
        active_profile_id,
    }))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_profiles(&user_id)).await?;
    Ok(Json(to_responses(rows)?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfileCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.len() > 64 {
        return Err(ApiError::bad_request("Profile name must be 1-64 characters"));
    }

    let user_id = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.create_profile(&NewProfile {
            user_id: &user_id,
            name: &name,
            icon_name: &req.icon_name,
            color: &req.color,
            description: &req.description,
            toggles: req.toggles,
            custom_keywords: &req.custom_keywords,
        })
    })
    .await?;

    info!("User {} created profile {}", claims.username, row.id);
    Ok((StatusCode::CREATED, Json(to_response(row)?)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(profile_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.get_profile(&user_id, &profile_id.to_string()))
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(to_response(row)?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(profile_id): Path<Uuid>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.is_empty() {
        return Err(ApiError::bad_request("No updates provided"));
    }
    if req.name.as_ref().is_some_and(|n| n.trim().is_empty() || n.len() > 64) {
        return Err(ApiError::bad_request("Profile name must be 1-64 characters"));
    }

    let user_id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.update_profile(&user_id, &profile_id.to_string(), &req))
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(to_response(row)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(profile_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let deleted = blocking(&state, move |db| db.delete_profile(&user_id, &profile_id.to_string())).await?;
    if !deleted {
        return Err(ApiError::not_found("Profile not found"));
    }
    info!("User {} deleted profile {}", claims.username, profile_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(profile_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.activate_profile(&user_id, &profile_id.to_string()))
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    info!("User {} activated profile {}", claims.username, profile_id);
    Ok(Json(to_response(row)?))
}
