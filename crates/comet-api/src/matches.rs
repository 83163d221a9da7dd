use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::{info, warn};

use comet_types::api::{MatchStatusResponse, OpenRoomResponse};
use comet_types::events::GatewayEvent;
use comet_types::models::MatchStatus;

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::profiles::load_profile;
use crate::state::AppState;

pub async fn get_match(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.chat.get_state(&identity.user_id).await?;
    Ok(Json(with_partner(&state, status).await?))
}

pub async fn approve_match(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.chat.approve(&identity.user_id).await?;
    info!("{} approval recorded, state {:?}", identity.user_id, status.state);

    // The partner's view now shows partner_approved
    if let Some(partner) = status.match_uid.as_deref() {
        notify_state(&state, partner).await;
    }

    Ok(Json(with_partner(&state, status).await?))
}

pub async fn open_room(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = state.chat.open_room(&identity.user_id).await?;

    let status = state.chat.get_state(&identity.user_id).await?;
    if let Some(partner) = status.match_uid.as_deref() {
        notify_state(&state, partner).await;
    }

    Ok(Json(OpenRoomResponse { room_id }))
}

/// Push a user's current handshake state to their gateway connections.
pub async fn notify_state(state: &AppState, user_id: &str) {
    match state.chat.get_state(user_id).await {
        Ok(status) => {
            state
                .dispatcher
                .send_to_user(
                    user_id,
                    GatewayEvent::MatchUpdate {
                        state: status.state,
                        match_uid: status.match_uid,
                        room_id: status.room_id,
                        partner_approved: status.partner_approved,
                    },
                )
                .await;
        }
        Err(e) => warn!("Could not load state for {} to notify: {}", user_id, e),
    }
}

async fn with_partner(state: &AppState, status: MatchStatus) -> Result<MatchStatusResponse, ApiError> {
    let partner = match status.match_uid.as_deref() {
        Some(uid) => load_profile(state, uid).await?,
        None => None,
    };

    Ok(MatchStatusResponse {
        state: status.state,
        match_uid: status.match_uid,
        room_id: status.room_id,
        partner_approved: status.partner_approved,
        partner,
    })
}
