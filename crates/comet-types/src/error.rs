use thiserror::Error;

/// Failures surfaced by the match handshake and chat core.
///
/// Only [`ChatError::Transient`] is retried; everything else is a state or
/// input problem and goes back to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("no active match for this user")]
    NotMatched,

    #[error("match has not been approved")]
    NotApproved,

    #[error("chat room not found")]
    RoomNotFound,

    #[error("user is not a member of this chat room")]
    NotRoomMember,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    Transient(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Stable machine-readable code used by the REST and gateway surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotMatched => "NOT_MATCHED",
            Self::NotApproved => "NOT_APPROVED",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::NotRoomMember => "NOT_ROOM_MEMBER",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Transient(_) => "TRANSIENT_ERROR",
        }
    }
}
