use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::error;

use comet_types::models::UserProfile;

use crate::error::ApiError;
use crate::state::AppState;

/// Shown when the profile store has no photo for a user.
pub const PLACEHOLDER_PHOTO_URL: &str = "/api/placeholder/200/200";

pub async fn get_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = load_profile(&state, &uid).await?.ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(profile))
}

/// Read a profile for display. Missing photos get the placeholder.
pub async fn load_profile(state: &AppState, uid: &str) -> Result<Option<UserProfile>, ApiError> {
    let db = state.db.clone();
    let uid = uid.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_profile(&uid))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;

    Ok(row.map(|r| {
        let mut profile = r.into_model();
        if profile.photo_url.is_empty() {
            profile.photo_url = PLACEHOLDER_PHOTO_URL.to_string();
        }
        profile
    }))
}
