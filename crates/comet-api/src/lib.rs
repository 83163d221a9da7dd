pub mod error;
pub mod feeds;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod profiles;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::middleware::{require_auth, require_service_token};
use crate::state::AppState;

/// All REST routes. The gateway upgrade route and HTTP layers are added by
/// the server binary.
pub fn router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/match", get(matches::get_match))
        .route("/match/approve", post(matches::approve_match))
        .route("/match/room", post(matches::open_room))
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/profiles/{uid}", get(profiles::get_profile))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let feed_routes = Router::new()
        .route("/internal/assignments/{uid}", put(feeds::put_assignment))
        .route("/internal/profiles/{uid}", put(feeds::put_profile))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_service_token));

    Router::new()
        .merge(user_routes)
        .merge(feed_routes)
        .with_state(state)
}
