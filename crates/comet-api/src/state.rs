use std::sync::Arc;

use comet_chat::ChatService;
use comet_db::Database;
use comet_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub chat: ChatService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    /// Bearer token the match source and profile store present on feed routes.
    pub service_token: String,
}
