use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use comet_chat::ChatService;
use comet_types::error::ChatError;
use comet_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::identity::verify_token;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: Identify, Ready, then the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    service: ChatService,
    dispatcher: Dispatcher,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(user_id) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready {
        user_id: user_id.clone(),
    };
    let Some(frame) = encode(&ready) else { return };
    if sender.send(frame).await.is_err() {
        return;
    }

    let (conn_id, mut user_rx) = dispatcher.register_user_channel(&user_id).await;

    // Room subscription tasks and command replies funnel through here.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let shutdown = CancellationToken::new();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            let event = tokio::select! {
                event = out_rx.recv() => event,
                event = user_rx.recv() => event,
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let Some(event) = event else { break };
            let Some(frame) = encode(&event) else { continue };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(service, user_id.clone(), out_tx, shutdown.clone());
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => session.handle_command(cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            session.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Stops every room subscription of this connection
    shutdown.cancel();
    dispatcher.unregister_user_channel(&user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<String> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return verify_token(jwt_secret, &token);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            None
        }
    }
}

/// Per-connection command state: which rooms are being streamed.
struct Session {
    service: ChatService,
    user_id: String,
    out_tx: mpsc::UnboundedSender<GatewayEvent>,
    shutdown: CancellationToken,
    subscriptions: HashMap<String, CancellationToken>,
}

impl Session {
    fn new(
        service: ChatService,
        user_id: String,
        out_tx: mpsc::UnboundedSender<GatewayEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            user_id,
            out_tx,
            shutdown,
            subscriptions: HashMap::new(),
        }
    }

    async fn handle_command(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Identify { .. } => {} // Already handled

            GatewayCommand::Subscribe { room_id } => self.subscribe(room_id).await,

            GatewayCommand::Unsubscribe { room_id } => {
                if let Some(token) = self.subscriptions.remove(&room_id) {
                    debug!("{} unsubscribed from room {}", self.user_id, room_id);
                    token.cancel();
                }
            }

            GatewayCommand::SendMessage {
                room_id,
                body,
                kind,
                reply_to,
            } => {
                // Delivery back to this client happens through its subscription.
                if let Err(e) = self
                    .service
                    .send(&self.user_id, &room_id, &body, kind, reply_to)
                    .await
                {
                    self.report(&e);
                }
            }
        }
    }

    async fn subscribe(&mut self, room_id: String) {
        let mut stream = match self.service.subscribe(&self.user_id, &room_id).await {
            Ok(stream) => stream,
            Err(e) => {
                self.report(&e);
                return;
            }
        };

        // Re-subscribing restarts from a full snapshot
        let token = self.shutdown.child_token();
        if let Some(previous) = self.subscriptions.insert(room_id.clone(), token.clone()) {
            previous.cancel();
        }

        info!("{} subscribed to room {}", self.user_id, room_id);
        let out_tx = self.out_tx.clone();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = token.cancelled() => break,
                    item = stream.next() => item,
                };

                let event = match item {
                    Some(Ok(messages)) => GatewayEvent::MessagesSnapshot {
                        room_id: room_id.clone(),
                        messages,
                    },
                    Some(Err(e)) => error_event(&e),
                    None => break,
                };

                if out_tx.send(event).is_err() {
                    break;
                }
            }
            debug!("Snapshot task for room {} stopped", room_id);
        });
    }

    fn report(&self, error: &ChatError) {
        debug!("{} command failed: {}", self.user_id, error);
        let _ = self.out_tx.send(error_event(error));
    }
}

fn error_event(error: &ChatError) -> GatewayEvent {
    GatewayEvent::Error {
        code: error.code().to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use comet_chat::ChatConfig;
    use comet_db::Database;
    use comet_types::models::MessageKind;

    use super::*;

    async fn session_in_room() -> (Session, mpsc::UnboundedReceiver<GatewayEvent>, String) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.assign_match("alice", "bob", "w42").unwrap();
        db.assign_match("bob", "alice", "w42").unwrap();
        db.set_match_approved("alice", "bob", "w42").unwrap();
        db.set_match_approved("bob", "alice", "w42").unwrap();
        let service = ChatService::new(db, ChatConfig::default());
        let room = service.open_room("alice").await.unwrap();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let session = Session::new(service, "alice".into(), out_tx, CancellationToken::new());
        (session, out_rx, room)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> GatewayEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for gateway event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn subscribe_streams_snapshots_after_sends() {
        let (mut session, mut rx, room) = session_in_room().await;

        session.handle_command(GatewayCommand::Subscribe { room_id: room.clone() }).await;
        match next_event(&mut rx).await {
            GatewayEvent::MessagesSnapshot { messages, .. } => assert!(messages.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }

        session
            .handle_command(GatewayCommand::SendMessage {
                room_id: room.clone(),
                body: "hi".into(),
                kind: MessageKind::Text,
                reply_to: None,
            })
            .await;
        match next_event(&mut rx).await {
            GatewayEvent::MessagesSnapshot { room_id, messages } => {
                assert_eq!(room_id, room);
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].sent_by, "alice");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_commands_report_error_codes() {
        let (mut session, mut rx, room) = session_in_room().await;

        session
            .handle_command(GatewayCommand::SendMessage {
                room_id: room,
                body: "  ".into(),
                kind: MessageKind::Text,
                reply_to: None,
            })
            .await;
        match next_event(&mut rx).await {
            GatewayEvent::Error { code, .. } => assert_eq!(code, "VALIDATION_ERROR"),
            other => panic!("unexpected event {:?}", other),
        }

        session.handle_command(GatewayCommand::Subscribe { room_id: "nope".into() }).await;
        match next_event(&mut rx).await {
            GatewayEvent::Error { code, .. } => assert_eq!(code, "ROOM_NOT_FOUND"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsubscribe_releases_the_room_subscription() {
        let (mut session, mut rx, room) = session_in_room().await;

        session.handle_command(GatewayCommand::Subscribe { room_id: room.clone() }).await;
        next_event(&mut rx).await;
        assert_eq!(session.service.channel().subscriber_count(&room), 1);

        session.handle_command(GatewayCommand::Unsubscribe { room_id: room.clone() }).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while session.service.channel().subscriber_count(&room) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription was not released");
    }
}
