use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use comet_types::events::GatewayEvent;

/// Routes targeted events to every live gateway connection of a user.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender)
    user_channels: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn unregister_user_channel(&self, user_id: &str, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(user_id);
            }
        }
    }

    /// Send an event to all of a user's connections. Offline users miss it;
    /// they read current state on their next request.
    pub async fn send_to_user(&self, user_id: &str, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(user_id) {
            for tx in conns.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(user_id)
            .map_or(0, |conns| conns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(user_id: &str) -> GatewayEvent {
        GatewayEvent::Ready {
            user_id: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn targeted_events_reach_every_connection_of_the_user_only() {
        let dispatcher = Dispatcher::new();
        let (_, mut tab_one) = dispatcher.register_user_channel("alice").await;
        let (_, mut tab_two) = dispatcher.register_user_channel("alice").await;
        let (_, mut other) = dispatcher.register_user_channel("bob").await;

        dispatcher.send_to_user("alice", ready("alice")).await;

        assert!(matches!(tab_one.try_recv(), Ok(GatewayEvent::Ready { .. })));
        assert!(matches!(tab_two.try_recv(), Ok(GatewayEvent::Ready { .. })));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_only_removes_that_connection() {
        let dispatcher = Dispatcher::new();
        let (first, _rx1) = dispatcher.register_user_channel("alice").await;
        let (_second, _rx2) = dispatcher.register_user_channel("alice").await;

        dispatcher.unregister_user_channel("alice", first).await;
        assert_eq!(dispatcher.connection_count("alice").await, 1);

        dispatcher.unregister_user_channel("alice", Uuid::new_v4()).await;
        assert_eq!(dispatcher.connection_count("alice").await, 1);
    }
}
