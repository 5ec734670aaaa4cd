use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
};
use tracing::info;

use wishlist_db::models::WishlistRow;
use wishlist_db::{Database, queries};
use wishlist_types::api::{Claims, ReplaceItemsRequest};
use wishlist_types::models::WishlistSnapshot;

use crate::engine::ReservationEngine;
use crate::error::ApiError;
use crate::snapshot;
use crate::state::AppState;
use crate::run_blocking;

const DEFAULT_TITLE: &str = "My Wishlist";

/// GET /wishlist: the caller's own list, created on first access.
pub async fn get_own_wishlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<WishlistSnapshot>, ApiError> {
    let db = state.db.clone();
    let viewer = claims.sub;

    let snapshot = run_blocking(move || {
        let wishlist = ensure_own_wishlist(&db, viewer)?;
        Ok(db.with_conn(|conn| snapshot::load_for(conn, &wishlist, viewer))?)
    })
    .await?;

    Ok(Json(snapshot))
}

/// GET /wishlist/{share_id}
pub async fn get_shared_wishlist(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<WishlistSnapshot>, ApiError> {
    let db = state.db.clone();

    let snapshot = run_blocking(move || {
        db.with_conn(|conn| snapshot::load(conn, &share_id, claims.sub))?
            .ok_or(ApiError::NotFound("Wishlist not found"))
    })
    .await?;

    Ok(Json(snapshot))
}

/// PUT /wishlist/{share_id}/items: replace the whole item set. Responds with
/// the caller's fresh view; live viewers get theirs through the hub.
pub async fn replace_items(
    State(state): State<AppState>,
    Path(share_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<Json<WishlistSnapshot>, ApiError> {
    let req: ReplaceItemsRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid item list: {e}")))?;

    let db = state.db.clone();
    let hub = state.hub.clone();
    let requester = claims.sub;

    let snapshot = run_blocking(move || {
        let wishlist = db
            .wishlist_by_share_id(&share_id)?
            .ok_or(ApiError::NotFound("Wishlist not found"))?;

        ReservationEngine::new(&db, &hub).replace_items(wishlist.id, requester, &req.items)?;

        db.with_conn(|conn| snapshot::load(conn, &share_id, requester))?
            .ok_or(ApiError::NotFound("Wishlist not found"))
    })
    .await?;

    Ok(Json(snapshot))
}

/// The owner's list, creating an empty one if they have none yet.
pub fn ensure_own_wishlist(db: &Database, owner_id: i64) -> anyhow::Result<WishlistRow> {
    db.with_tx(|tx| -> anyhow::Result<WishlistRow> {
        if let Some(existing) = queries::wishlist_by_owner(tx, owner_id)? {
            return Ok(existing);
        }

        let share_id = new_share_id();
        if queries::insert_wishlist(tx, owner_id, DEFAULT_TITLE, &share_id, &wishlist_db::now())? {
            info!("Created wishlist {} for user {}", share_id, owner_id);
        }

        queries::wishlist_by_owner(tx, owner_id)?
            .ok_or_else(|| anyhow::anyhow!("Wishlist for user {} missing after insert", owner_id))
    })
}

/// Random public identifier, unrelated to the row id.
fn new_share_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wishlist_types::models::TelegramUser;

    #[test]
    fn own_wishlist_is_created_once() {
        let db = Database::open_in_memory().unwrap();
        let user = TelegramUser {
            id: 5,
            first_name: "Eve".into(),
            last_name: None,
            username: None,
            language_code: None,
            is_premium: None,
            photo_url: None,
        };
        db.upsert_user(&user, "2024-01-01T00:00:00.000Z").unwrap();

        let first = ensure_own_wishlist(&db, 5).unwrap();
        let second = ensure_own_wishlist(&db, 5).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.share_id, second.share_id);
        assert_eq!(first.title, DEFAULT_TITLE);
        assert_ne!(first.share_id, first.id.to_string());
    }

    #[test]
    fn share_ids_are_random_hex() {
        let a = new_share_id();
        let b = new_share_id();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
