use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use wishlist_api::AppState;
use wishlist_api::middleware::require_auth;
use wishlist_api::{auth, live, reservations, wishlist};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/telegram", post(auth::telegram_auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/wishlist", get(wishlist::get_own_wishlist))
        .route("/wishlist/{share_id}", get(wishlist::get_shared_wishlist))
        .route("/wishlist/{share_id}/items", put(wishlist::replace_items))
        .route(
            "/items/{item_id}/reservation",
            post(reservations::reserve_item).delete(reservations::cancel_reservation),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Authenticates itself: the token may come in the query string
    let live_route = Router::new()
        .route("/wishlist/{share_id}/live", get(live::live_view))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(live_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
