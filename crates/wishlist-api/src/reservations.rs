use axum::{
    Extension, Json,
    extract::{Path, State},
};

use wishlist_types::api::{Claims, ReservationResponse};

use crate::engine::{ReservationEngine, ReserveOutcome};
use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

/// POST /items/{item_id}/reservation
pub async fn reserve_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let item_id = parse_item_id(&item_id)?;
    let db = state.db.clone();
    let hub = state.hub.clone();

    let outcome =
        run_blocking(move || ReservationEngine::new(&db, &hub).reserve(item_id, claims.sub))
            .await?;

    Ok(Json(ReservationResponse {
        reserved: true,
        already_reserved: Some(outcome == ReserveOutcome::AlreadyReservedByYou),
    }))
}

/// DELETE /items/{item_id}/reservation
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let item_id = parse_item_id(&item_id)?;
    let db = state.db.clone();
    let hub = state.hub.clone();

    run_blocking(move || ReservationEngine::new(&db, &hub).cancel(item_id, claims.sub)).await?;

    Ok(Json(ReservationResponse {
        reserved: false,
        already_reserved: None,
    }))
}

/// Item ids in the path are numeric; anything else is a malformed request.
fn parse_item_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid item id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_must_be_numeric() {
        assert_eq!(parse_item_id("42").unwrap(), 42);
        assert!(matches!(parse_item_id("abc"), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_item_id(""), Err(ApiError::BadRequest(_))));
    }
}
