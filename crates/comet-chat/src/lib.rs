//! Match-approval handshake and realtime chat delivery.
//!
//! Dependency order, leaves first: [`channel`] → [`provisioner`] →
//! [`coordinator`]. [`service::ChatService`] bundles them for callers.

pub mod channel;
pub mod coordinator;
pub mod provisioner;
pub mod retry;
pub mod service;

use std::sync::Arc;

use tracing::error;

use comet_db::Database;
use comet_types::error::ChatError;

pub use coordinator::{ApprovalPolicy, MatchCoordinator};
pub use channel::{MessageChannel, SnapshotStream};
pub use provisioner::RoomProvisioner;
pub use retry::RetryConfig;
pub use service::ChatService;

/// Knobs shared by the core components.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub approval_policy: ApprovalPolicy,
    pub retry: RetryConfig,
}

/// Run a blocking store call off the async runtime. Any store failure is
/// reported as transient; callers validate state before touching the store.
pub(crate) async fn blocking<T, F>(db: &Arc<Database>, f: F) -> Result<T, ChatError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ChatError::Transient(e.to_string())
        })?
        .map_err(|e| ChatError::Transient(format!("{:#}", e)))
}
