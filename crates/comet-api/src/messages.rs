use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use comet_types::api::SendMessageRequest;

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::state::AppState;

/// Full current log of the room. Live updates come through the gateway.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.chat.snapshot(&identity.user_id, &room_id).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .chat
        .send(&identity.user_id, &room_id, &req.body, req.kind, req.reply_to)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
