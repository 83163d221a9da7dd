use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};

use comet_types::api::{AssignMatchRequest, UpsertProfileRequest};
use comet_types::error::ChatError;
use comet_types::models::UserProfile;

use crate::error::ApiError;
use crate::matches::notify_state;
use crate::state::AppState;

/// Match-source write: the user's pairing for a new (or the current) period.
pub async fn put_assignment(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(req): Json<AssignMatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.period.trim().is_empty() {
        return Err(ChatError::Validation("period is required".into()).into());
    }

    let db = state.db.clone();
    let (user, match_uid, period) = (uid.clone(), req.match_uid.clone(), req.period.clone());
    let changed = tokio::task::spawn_blocking(move || db.assign_match(&user, &match_uid, &period))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;

    if changed {
        info!("{} assigned match '{}' for period {}", uid, req.match_uid, req.period);
        notify_state(&state, &uid).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Profile-store write.
pub async fn put_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(req): Json<UpsertProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = UserProfile {
        uid,
        name: req.name,
        handle: req.handle,
        photo_url: req.photo_url,
        place_of_birth: req.place_of_birth,
    };

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.upsert_profile(&profile))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;

    Ok(StatusCode::NO_CONTENT)
}
