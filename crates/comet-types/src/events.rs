use serde::{Deserialize, Serialize};

use crate::models::{MatchState, Message, MessageKind, ReplyRef};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful identification
    Ready { user_id: String },

    /// Full ordered log of a subscribed room. Always a complete snapshot,
    /// never a delta.
    MessagesSnapshot {
        room_id: String,
        messages: Vec<Message>,
    },

    /// The user's handshake state changed (partner approved, room opened)
    MatchUpdate {
        state: MatchState,
        match_uid: Option<String>,
        room_id: Option<String>,
        partner_approved: bool,
    },

    /// A command from this client failed
    Error { code: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving snapshots for a room
    Subscribe { room_id: String },

    /// Stop receiving snapshots for a room
    Unsubscribe { room_id: String },

    /// Append a message to a room
    SendMessage {
        room_id: String,
        body: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default)]
        reply_to: Option<ReplyRef>,
    },
}
