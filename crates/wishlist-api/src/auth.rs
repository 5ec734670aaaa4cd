use axum::{Json, body::Bytes, extract::State};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use wishlist_crypto::validate_init_data;
use wishlist_types::api::{AuthResponse, TelegramAuthRequest};

use crate::error::ApiError;
use crate::middleware::create_token;
use crate::run_blocking;
use crate::snapshot;
use crate::state::AppState;

/// POST /auth/telegram: exchange signed init data for a session token.
pub async fn telegram_auth(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AuthResponse>, ApiError> {
    let req: TelegramAuthRequest = if body.is_empty() {
        TelegramAuthRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let init_data = req
        .init_data
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::BadRequest("initData is required".into()))?;

    let verified = validate_init_data(&init_data, &state.bot_token).map_err(|e| {
        debug!("Rejected init data: {}", e);
        ApiError::Unauthenticated
    })?;

    if let Some(max_age) = state.init_data_max_age {
        if !is_fresh(verified.auth_date, max_age, Utc::now()) {
            debug!(
                "Rejected stale init data for user {} (auth_date {:?})",
                verified.user.id, verified.auth_date
            );
            return Err(ApiError::Unauthenticated);
        }
    }

    let db = state.db.clone();
    let user = verified.user;
    let row = run_blocking(move || Ok(db.upsert_user(&user, &wishlist_db::now())?)).await?;

    let token = create_token(&state.jwt_secret, row.id, state.session_ttl)?;
    info!("User {} signed in", row.id);

    Ok(Json(AuthResponse {
        user: snapshot::user_from_row(row),
        token,
    }))
}

/// Whether a payload issued at `auth_date` (unix seconds) is still within
/// `max_age` of `now`. A missing date is never fresh.
fn is_fresh(auth_date: Option<i64>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Some(issued) = auth_date.and_then(|secs| DateTime::from_timestamp(secs, 0)) else {
        return false;
    };
    now.signed_duration_since(issued) <= max_age
}
