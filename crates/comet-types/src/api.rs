use serde::{Deserialize, Serialize};

use crate::models::{MatchState, MessageKind, ReplyRef, UserProfile};

// -- Identity --

/// Claims issued by the identity provider. `sub` is the opaque user id the
/// core trusts as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Match handshake --

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchStatusResponse {
    pub state: MatchState,
    pub match_uid: Option<String>,
    pub room_id: Option<String>,
    pub partner_approved: bool,
    pub partner: Option<UserProfile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenRoomResponse {
    pub room_id: String,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub body: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub reply_to: Option<ReplyRef>,
}

// -- Feeds from external collaborators --

/// Written by the match source at the start of each assignment period.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignMatchRequest {
    #[serde(default)]
    pub match_uid: String,
    pub period: String,
}

/// Written by the profile store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertProfileRequest {
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub place_of_birth: String,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
