//! Print a signed init data string for local testing.
//!
//! Usage: `wishlist-init-data [profile.json]` (default `mock-user.json`).
//! Signs with `TELEGRAM_BOT_TOKEN`, read from the environment or `.env`.

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;

use wishlist_types::models::TelegramUser;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .context("TELEGRAM_BOT_TOKEN is not set")?;

    let path: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mock-user.json".into())
        .into();
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // Parse first so a broken profile fails here rather than at sign-in
    serde_json::from_str::<TelegramUser>(&raw)
        .with_context(|| format!("{} is not a valid user profile", path.display()))?;
    let user: serde_json::Value = serde_json::from_str(&raw)?;
    let user = serde_json::to_string(&user)?;

    let query_id = hex::encode(rand::random::<[u8; 12]>());
    let auth_date = Utc::now().timestamp().to_string();

    let init_data = wishlist_crypto::sign_init_data(
        &[
            ("query_id", query_id.as_str()),
            ("user", user.as_str()),
            ("auth_date", auth_date.as_str()),
        ],
        &bot_token,
    )?;

    println!("{init_data}");
    Ok(())
}
