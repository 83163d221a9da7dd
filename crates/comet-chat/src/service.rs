use std::sync::Arc;

use comet_db::Database;
use comet_types::error::ChatError;
use comet_types::models::{ChatRoom, MatchStatus, Message, MessageKind, ReplyRef};

use crate::ChatConfig;
use crate::channel::{MessageChannel, SnapshotStream};
use crate::coordinator::MatchCoordinator;
use crate::provisioner::RoomProvisioner;

/// The surface presentation code talks to. Every call acts on behalf of a
/// verified user id; room access is limited to the room's two members.
#[derive(Clone)]
pub struct ChatService {
    coordinator: MatchCoordinator,
    channel: MessageChannel,
}

impl ChatService {
    pub fn new(db: Arc<Database>, config: ChatConfig) -> Self {
        let channel = MessageChannel::new(db.clone(), config.retry.clone());
        let provisioner =
            RoomProvisioner::new(db.clone(), config.approval_policy, config.retry.clone());
        let coordinator = MatchCoordinator::new(db, provisioner, config.retry);
        Self {
            coordinator,
            channel,
        }
    }

    pub async fn get_state(&self, user_uid: &str) -> Result<MatchStatus, ChatError> {
        self.coordinator.get_state(user_uid).await
    }

    pub async fn approve(&self, user_uid: &str) -> Result<MatchStatus, ChatError> {
        self.coordinator.approve(user_uid).await
    }

    pub async fn open_room(&self, user_uid: &str) -> Result<String, ChatError> {
        self.coordinator.open_room(user_uid).await
    }

    pub async fn send(
        &self,
        user_uid: &str,
        room_id: &str,
        body: &str,
        kind: MessageKind,
        reply_to: Option<ReplyRef>,
    ) -> Result<Message, ChatError> {
        self.channel.send(room_id, user_uid, body, kind, reply_to).await
    }

    pub async fn subscribe(&self, user_uid: &str, room_id: &str) -> Result<SnapshotStream, ChatError> {
        self.member_room(user_uid, room_id).await?;
        self.channel.subscribe(room_id).await
    }

    pub async fn snapshot(&self, user_uid: &str, room_id: &str) -> Result<Vec<Message>, ChatError> {
        self.member_room(user_uid, room_id).await?;
        self.channel.snapshot(room_id).await
    }

    pub fn coordinator(&self) -> &MatchCoordinator {
        &self.coordinator
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    async fn member_room(&self, user_uid: &str, room_id: &str) -> Result<ChatRoom, ChatError> {
        let room = self.channel.room(room_id).await?;
        if !room.has_member(user_uid) {
            return Err(ChatError::NotRoomMember);
        }
        Ok(room)
    }
}
