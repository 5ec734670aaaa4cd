use std::sync::Arc;

use chrono::Duration;

use wishlist_db::Database;
use wishlist_gateway::Hub;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub hub: Hub,
    /// Token of the bot the mini-app belongs to; signs incoming init data.
    pub bot_token: String,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    /// Reject init data older than this. `None` accepts any age.
    pub init_data_max_age: Option<Duration>,
}
