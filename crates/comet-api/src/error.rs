use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use comet_types::api::ErrorResponse;
use comet_types::error::ChatError;

/// Error returned by every handler, rendered as `{ code, message }`.
#[derive(Debug)]
pub enum ApiError {
    Chat(ChatError),
    NotFound(&'static str),
    Internal(String),
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError::Chat(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Chat(e) => {
                let status = match e {
                    ChatError::NotMatched | ChatError::NotApproved => StatusCode::CONFLICT,
                    ChatError::RoomNotFound => StatusCode::NOT_FOUND,
                    ChatError::NotRoomMember => StatusCode::FORBIDDEN,
                    ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                    ChatError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.code(), e.to_string())
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{} not found", what)),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error".to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_statuses() {
        let cases = [
            (ChatError::NotMatched, StatusCode::CONFLICT),
            (ChatError::NotApproved, StatusCode::CONFLICT),
            (ChatError::RoomNotFound, StatusCode::NOT_FOUND),
            (ChatError::NotRoomMember, StatusCode::FORBIDDEN),
            (ChatError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::Transient("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
