pub mod auth;
pub mod engine;
pub mod error;
pub mod live;
pub mod middleware;
pub mod reservations;
pub mod snapshot;
pub mod state;
pub mod wishlist;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Run blocking storage work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
}
