mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use comet_api::state::{AppState, AppStateInner};
use comet_chat::ChatService;
use comet_gateway::connection;
use comet_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comet=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("Approval policy: {}", config.chat.approval_policy);

    // Init database
    let db = Arc::new(comet_db::Database::open(&config.db_path)?);

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        chat: ChatService::new(db, config.chat.clone()),
        dispatcher: Dispatcher::new(),
        jwt_secret: config.jwt_secret.clone(),
        service_token: config.service_token.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(app_state.clone());

    let app = comet_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    info!("Comet server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Comet server stopped");
    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.chat.clone(),
            state.dispatcher.clone(),
            state.jwt_secret.clone(),
        )
    })
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
    shutdown.cancel();
}
