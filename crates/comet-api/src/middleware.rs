use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};

use comet_gateway::identity::verify_token;

use crate::state::AppState;

/// Verified caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

fn bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Extract and validate the identity-provider JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer(&req).ok_or(StatusCode::UNAUTHORIZED)?;
    let user_id = verify_token(&state.jwt_secret, token).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Identity { user_id });
    Ok(next.run(req).await)
}

/// Guard for the feed routes written by external collaborators.
pub async fn require_service_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer(&req).ok_or(StatusCode::UNAUTHORIZED)?;
    if state.service_token.is_empty() || token != state.service_token {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}
