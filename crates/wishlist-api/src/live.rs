use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;

use wishlist_gateway::connection;

use crate::error::ApiError;
use crate::middleware::{bearer_token, verify_token};
use crate::run_blocking;
use crate::state::AppState;

/// Browsers cannot set headers on a WebSocket handshake, so the session
/// token may also arrive as `?token=`.
#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    pub token: Option<String>,
}

/// GET /wishlist/{share_id}/live: upgrade to a live view of one list.
pub async fn live_view(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .or(query.token.as_deref())
        .ok_or(ApiError::Unauthenticated)?;
    let claims = verify_token(&state.jwt_secret, token)?;

    let db = state.db.clone();
    let lookup = share_id.clone();
    run_blocking(move || {
        db.wishlist_by_share_id(&lookup)?
            .map(|_| ())
            .ok_or(ApiError::NotFound("Wishlist not found"))
    })
    .await?;

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_live_view(socket, hub, share_id, claims.sub)
    }))
}
