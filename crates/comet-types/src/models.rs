use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display data owned by the profile store. Never used for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub handle: String,
    pub photo_url: String,
    pub place_of_birth: String,
}

/// One user's pairing for the current assignment period.
///
/// `match_uid` is written only by the match source; `match_approved` and
/// `chat_room_id` only by the core. Empty strings mean "unset".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchAssignment {
    pub user_uid: String,
    pub match_uid: String,
    pub match_approved: bool,
    pub chat_room_id: String,
    pub period: String,
    pub updated_at: DateTime<Utc>,
}

impl MatchAssignment {
    pub fn has_match(&self) -> bool {
        !self.match_uid.is_empty()
    }

    pub fn room_id(&self) -> Option<&str> {
        (!self.chat_room_id.is_empty()).then_some(self.chat_room_id.as_str())
    }

    /// True when this assignment points back at `uid`.
    pub fn is_paired_with(&self, uid: &str) -> bool {
        self.has_match() && self.match_uid == uid
    }
}

/// Per-user, per-period handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    NoMatch,
    PendingApproval,
    Approved,
    ChatActive,
}

impl MatchState {
    /// Derive the state from a stored assignment (or its absence).
    pub fn of(assignment: Option<&MatchAssignment>) -> Self {
        match assignment {
            None => Self::NoMatch,
            Some(a) if !a.has_match() => Self::NoMatch,
            Some(a) if a.room_id().is_some() => Self::ChatActive,
            Some(a) if a.match_approved => Self::Approved,
            Some(_) => Self::PendingApproval,
        }
    }
}

/// What `getState` hands to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatus {
    pub state: MatchState,
    pub match_uid: Option<String>,
    pub room_id: Option<String>,
    pub partner_approved: bool,
    pub period: Option<String>,
}

impl MatchStatus {
    pub fn no_match() -> Self {
        Self {
            state: MatchState::NoMatch,
            match_uid: None,
            room_id: None,
            partner_approved: false,
            period: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn has_member(&self, uid: &str) -> bool {
        self.user_a == uid || self.user_b == uid
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Voice,
    Other,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown message kind '{}'", other)),
        }
    }
}

/// Weak reference to the message being replied to, by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub message_id: i64,
    pub author: String,
    pub kind: MessageKind,
}

/// An entry in a room's append-only log. `id` is the store-assigned ordering
/// token; `created_at` is advisory and never used for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub room_id: String,
    pub body: String,
    pub sent_by: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub reply_to: Option<ReplyRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(match_uid: &str, approved: bool, room: &str) -> MatchAssignment {
        MatchAssignment {
            user_uid: "alice".into(),
            match_uid: match_uid.into(),
            match_approved: approved,
            chat_room_id: room.into(),
            period: "2026-W42".into(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn state_derivation() {
        assert_eq!(MatchState::of(None), MatchState::NoMatch);
        assert_eq!(MatchState::of(Some(&assignment("", true, ""))), MatchState::NoMatch);
        assert_eq!(MatchState::of(Some(&assignment("bob", false, ""))), MatchState::PendingApproval);
        assert_eq!(MatchState::of(Some(&assignment("bob", true, ""))), MatchState::Approved);
        assert_eq!(MatchState::of(Some(&assignment("bob", true, "r1"))), MatchState::ChatActive);
    }

    #[test]
    fn message_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MessageKind::Voice).unwrap(), "\"voice\"");
        assert_eq!("other".parse::<MessageKind>().unwrap(), MessageKind::Other);
        assert!("MessageType.text".parse::<MessageKind>().is_err());
    }

    #[test]
    fn state_wire_names() {
        assert_eq!(serde_json::to_string(&MatchState::PendingApproval).unwrap(), "\"pending_approval\"");
    }
}
