use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures_util::Stream;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

use comet_db::Database;
use comet_types::error::ChatError;
use comet_types::models::{ChatRoom, Message, MessageKind, ReplyRef};

use crate::blocking;
use crate::retry::{RetryConfig, with_retry};

/// Longest accepted message body, in characters.
pub const MAX_BODY_CHARS: usize = 4_000;

/// Per-room notification buffer. Lag is harmless: a lagging subscriber
/// re-reads the full log anyway.
const ROOM_BUFFER: usize = 64;

/// Lazy, never-ending sequence of full room snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<Message>, ChatError>> + Send>>;

/// Wakes subscribers of a room after each append. Carries only the new
/// message id; subscribers always re-read the log.
#[derive(Clone, Default)]
struct RoomHub {
    rooms: Arc<Mutex<HashMap<String, broadcast::Sender<i64>>>>,
}

impl RoomHub {
    fn receiver(&self, room_id: &str) -> broadcast::Receiver<i64> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_BUFFER).0)
            .subscribe()
    }

    fn notify(&self, room_id: &str, message_id: i64) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = rooms.get(room_id) {
            // Err means every subscriber is gone
            if tx.send(message_id).is_err() {
                rooms.remove(room_id);
            }
        }
    }

    fn subscriber_count(&self, room_id: &str) -> usize {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.get(room_id).map_or(0, |tx| tx.receiver_count())
    }
}

/// Ordered, append-only message log per room with live snapshot delivery.
#[derive(Clone)]
pub struct MessageChannel {
    db: Arc<Database>,
    hub: RoomHub,
    retry: RetryConfig,
}

impl MessageChannel {
    pub fn new(db: Arc<Database>, retry: RetryConfig) -> Self {
        Self {
            db,
            hub: RoomHub::default(),
            retry,
        }
    }

    /// Look up a provisioned room.
    pub async fn room(&self, room_id: &str) -> Result<ChatRoom, ChatError> {
        let row = with_retry(&self.retry, "get_room", |_| {
            let room_id = room_id.to_string();
            blocking(&self.db, move |db| db.get_room(&room_id))
        })
        .await?;
        row.map(|r| r.into_model()).ok_or(ChatError::RoomNotFound)
    }

    /// Append a message. The id and timestamp come from the store; the body is
    /// stored trimmed.
    pub async fn send(
        &self,
        room_id: &str,
        author_uid: &str,
        body: &str,
        kind: MessageKind,
        reply_to: Option<ReplyRef>,
    ) -> Result<Message, ChatError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::Validation("message body is empty".into()));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(ChatError::Validation(format!(
                "message body exceeds {} characters",
                MAX_BODY_CHARS
            )));
        }

        let room = self.room(room_id).await?;
        if !room.has_member(author_uid) {
            return Err(ChatError::NotRoomMember);
        }

        if let Some(reply) = &reply_to {
            let target = reply.message_id;
            let exists = with_retry(&self.retry, "message_exists", |_| {
                let room_id = room_id.to_string();
                blocking(&self.db, move |db| db.message_exists(&room_id, target))
            })
            .await?;
            if !exists {
                return Err(ChatError::Validation(format!(
                    "reply target {} is not in this room",
                    target
                )));
            }
        }

        let row = with_retry(&self.retry, "insert_message", |_| {
            let room_id = room_id.to_string();
            let author = author_uid.to_string();
            let body = body.to_string();
            let reply = reply_to.clone();
            blocking(&self.db, move |db| {
                db.insert_message(&room_id, &author, &body, kind, reply.as_ref())
            })
        })
        .await?;

        let message = row.into_model();
        debug!("{} sent message {} in room {}", author_uid, message.id, room_id);
        self.hub.notify(room_id, message.id);
        Ok(message)
    }

    /// Current full log of a room, ordered by id.
    pub async fn snapshot(&self, room_id: &str) -> Result<Vec<Message>, ChatError> {
        read_log(&self.db, &self.retry, room_id).await
    }

    /// Subscribe to a room. The first item is the complete current log; each
    /// later item is the complete log after one or more appends. Dropping the
    /// stream releases the subscription.
    pub async fn subscribe(&self, room_id: &str) -> Result<SnapshotStream, ChatError> {
        self.room(room_id).await?;

        // Register before the first read so no append can fall in between.
        let mut rx = self.hub.receiver(room_id);
        let db = self.db.clone();
        let retry = self.retry.clone();
        let room_id = room_id.to_string();
        info!("Subscription opened for room {}", room_id);

        let stream = async_stream::stream! {
            let mut last_seen: Option<(usize, Option<i64>)> = None;
            loop {
                match read_log(&db, &retry, &room_id).await {
                    Ok(messages) => {
                        let mark = (messages.len(), messages.last().map(|m| m.id));
                        if last_seen != Some(mark) {
                            last_seen = Some(mark);
                            yield Ok(messages);
                        }
                    }
                    Err(e) => yield Err(e),
                }

                match rx.recv().await {
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("Room {} subscriber lagged by {} notifications", room_id, n);
                    }
                    Err(RecvError::Closed) => break,
                }

                // Coalesce a burst of appends into one snapshot
                loop {
                    match rx.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Live subscriptions for a room.
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.hub.subscriber_count(room_id)
    }
}

async fn read_log(
    db: &Arc<Database>,
    retry: &RetryConfig,
    room_id: &str,
) -> Result<Vec<Message>, ChatError> {
    let rows = with_retry(retry, "list_messages", |_| {
        let room_id = room_id.to_string();
        blocking(db, move |db| db.list_messages(&room_id))
    })
    .await?;
    Ok(rows.into_iter().map(|r| r.into_model()).collect())
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn channel_with_room() -> MessageChannel {
        let db = Database::open_in_memory().unwrap();
        db.assign_match("alice", "bob", "w42").unwrap();
        db.assign_match("bob", "alice", "w42").unwrap();
        db.claim_room("alice", "w42", "bob", "w42", "r1").unwrap();
        MessageChannel::new(Arc::new(db), RetryConfig::default())
    }

    #[tokio::test]
    async fn empty_body_is_rejected_and_log_unchanged() {
        let channel = channel_with_room();
        let err = channel.send("r1", "alice", "   \n", MessageKind::Text, None).await;
        assert!(matches!(err, Err(ChatError::Validation(_))));
        assert!(channel.snapshot("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let channel = channel_with_room();
        let err = channel.send("nope", "alice", "hi", MessageKind::Text, None).await;
        assert_eq!(err.unwrap_err(), ChatError::RoomNotFound);
        assert!(matches!(channel.subscribe("nope").await, Err(ChatError::RoomNotFound)));
    }

    #[tokio::test]
    async fn outsider_cannot_write() {
        let channel = channel_with_room();
        let err = channel.send("r1", "mallory", "hi", MessageKind::Text, None).await;
        assert_eq!(err.unwrap_err(), ChatError::NotRoomMember);
    }

    #[tokio::test]
    async fn body_is_trimmed_and_reply_preserved() {
        let channel = channel_with_room();
        let first = channel.send("r1", "alice", "  hi  ", MessageKind::Text, None).await.unwrap();
        assert_eq!(first.body, "hi");

        let reply = ReplyRef {
            message_id: first.id,
            author: "alice".into(),
            kind: MessageKind::Text,
        };
        channel
            .send("r1", "bob", "hey", MessageKind::Voice, Some(reply.clone()))
            .await
            .unwrap();

        let log = channel.snapshot("r1").await.unwrap();
        assert_eq!(log[1].reply_to, Some(reply));
    }

    #[tokio::test]
    async fn reply_to_missing_message_is_rejected() {
        let channel = channel_with_room();
        let reply = ReplyRef {
            message_id: 999,
            author: "bob".into(),
            kind: MessageKind::Text,
        };
        let err = channel.send("r1", "alice", "hi", MessageKind::Text, Some(reply)).await;
        assert!(matches!(err, Err(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn subscriber_sees_history_then_full_snapshots() {
        let channel = channel_with_room();
        channel.send("r1", "alice", "hi", MessageKind::Text, None).await.unwrap();

        let mut stream = channel.subscribe("r1").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        channel.send("r1", "bob", "hey", MessageKind::Text, None).await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        let bodies: Vec<_> = second.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["hi", "hey"]);
    }

    #[tokio::test]
    async fn resubscribe_yields_full_state_again() {
        let channel = channel_with_room();
        channel.send("r1", "alice", "hi", MessageKind::Text, None).await.unwrap();
        channel.send("r1", "bob", "hey", MessageKind::Text, None).await.unwrap();

        let mut a = channel.subscribe("r1").await.unwrap();
        let from_a = a.next().await.unwrap().unwrap();
        drop(a);

        let mut b = channel.subscribe("r1").await.unwrap();
        let from_b = b.next().await.unwrap().unwrap();
        assert_eq!(from_a, from_b);
        assert_eq!(from_b.len(), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_subscription() {
        let channel = channel_with_room();
        let stream = channel.subscribe("r1").await.unwrap();
        assert_eq!(channel.subscriber_count("r1"), 1);
        drop(stream);
        assert_eq!(channel.subscriber_count("r1"), 0);

        // The next append prunes the idle room entry without error
        channel.send("r1", "alice", "hi", MessageKind::Text, None).await.unwrap();
        assert_eq!(channel.subscriber_count("r1"), 0);
    }
}
