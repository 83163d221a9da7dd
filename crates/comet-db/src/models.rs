//! Database row types. These map directly to SQLite rows; `into_model`
//! converts them into the shared comet-types models.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use comet_types::models::{ChatRoom, MatchAssignment, Message, MessageKind, ReplyRef, UserProfile};

pub struct ProfileRow {
    pub uid: String,
    pub name: String,
    pub handle: String,
    pub photo_url: String,
    pub place_of_birth: String,
}

pub struct AssignmentRow {
    pub user_uid: String,
    pub match_uid: String,
    pub match_approved: bool,
    pub chat_room_id: String,
    pub period: String,
    pub updated_at: String,
}

pub struct RoomRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub room_id: String,
    pub sent_by: String,
    pub body: String,
    pub kind: String,
    pub reply_message_id: Option<i64>,
    pub reply_author: Option<String>,
    pub reply_kind: Option<String>,
    pub created_at: String,
}

impl ProfileRow {
    pub fn into_model(self) -> UserProfile {
        UserProfile {
            uid: self.uid,
            name: self.name,
            handle: self.handle,
            photo_url: self.photo_url,
            place_of_birth: self.place_of_birth,
        }
    }
}

impl AssignmentRow {
    pub fn into_model(self) -> MatchAssignment {
        let updated_at = parse_timestamp(&self.updated_at, &self.user_uid);
        MatchAssignment {
            user_uid: self.user_uid,
            match_uid: self.match_uid,
            match_approved: self.match_approved,
            chat_room_id: self.chat_room_id,
            period: self.period,
            updated_at,
        }
    }
}

impl RoomRow {
    pub fn into_model(self) -> ChatRoom {
        let created_at = parse_timestamp(&self.created_at, &self.id);
        ChatRoom {
            id: self.id,
            user_a: self.user_a,
            user_b: self.user_b,
            created_at,
        }
    }
}

impl MessageRow {
    pub fn into_model(self) -> Message {
        let created_at = parse_timestamp(&self.created_at, &self.room_id);
        let kind = parse_kind(&self.kind, self.id);

        // A reply is only meaningful with all three columns present.
        let reply_to = match (self.reply_message_id, self.reply_author, self.reply_kind) {
            (Some(message_id), Some(author), Some(kind)) => Some(ReplyRef {
                message_id,
                author,
                kind: parse_kind(&kind, self.id),
            }),
            _ => None,
        };

        Message {
            id: self.id,
            room_id: self.room_id,
            body: self.body,
            sent_by: self.sent_by,
            created_at,
            kind,
            reply_to,
        }
    }
}

fn parse_kind(raw: &str, message_id: i64) -> MessageKind {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt kind on message {}: {}", message_id, e);
        MessageKind::Other
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
fn parse_timestamp(raw: &str, owner: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on '{}': {}", raw, owner, e);
            DateTime::default()
        })
}
