use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::{Duration, Utc};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl: Duration,
    pub init_data_max_age: Option<Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the config from any variable lookup. Empty values count as unset.
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        let bot_token = var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is not set")?;

        let jwt_secret = var("WISHLIST_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("WISHLIST_JWT_SECRET is unset or still a placeholder");
        }

        let db_path = var("WISHLIST_DB_PATH").unwrap_or_else(|| "wishlist.db".into()).into();
        let host = var("WISHLIST_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("WISHLIST_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("WISHLIST_PORT must be a port number")?;

        let session_days: i64 = var("WISHLIST_SESSION_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("WISHLIST_SESSION_DAYS must be a whole number of days")?;
        if session_days <= 0 {
            bail!("WISHLIST_SESSION_DAYS must be positive");
        }
        let session_ttl = Duration::try_days(session_days)
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .context("WISHLIST_SESSION_DAYS is too large")?;

        let init_data_max_age = var("WISHLIST_INIT_DATA_MAX_AGE_SECS")
            .map(|raw| raw.parse::<u32>())
            .transpose()
            .context("WISHLIST_INIT_DATA_MAX_AGE_SECS must be a number of seconds")?
            .map(|secs| Duration::seconds(secs.into()));

        Ok(Self {
            bot_token,
            jwt_secret,
            db_path,
            host,
            port,
            session_ttl,
            init_data_max_age,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("TELEGRAM_BOT_TOKEN", "123456:TEST-TOKEN"),
        ("WISHLIST_JWT_SECRET", "a-real-secret"),
    ];

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.db_path, PathBuf::from("wishlist.db"));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.session_ttl, Duration::days(30));
        assert!(config.init_data_max_age.is_none());
    }

    #[test]
    fn placeholder_or_missing_secrets_are_rejected() {
        assert!(config(&[("TELEGRAM_BOT_TOKEN", "t")]).is_err());
        assert!(config(&[("WISHLIST_JWT_SECRET", "a-real-secret")]).is_err());
        assert!(
            config(&[
                ("TELEGRAM_BOT_TOKEN", "t"),
                ("WISHLIST_JWT_SECRET", "dev-secret-change-me"),
            ])
            .is_err()
        );
    }

    #[test]
    fn bad_numbers_are_errors_not_defaults() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WISHLIST_PORT", "eighty"));
        assert!(config(&pairs).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WISHLIST_INIT_DATA_MAX_AGE_SECS", "-5"));
        assert!(config(&pairs).is_err());
    }

    #[test]
    fn session_lifetime_must_fit_a_timestamp() {
        for days in ["1000000000", "200000000000"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("WISHLIST_SESSION_DAYS", days));
            assert!(config(&pairs).is_err(), "{days} days accepted");
        }

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WISHLIST_SESSION_DAYS", "3650"));
        assert_eq!(config(&pairs).unwrap().session_ttl, Duration::days(3650));
    }

    #[test]
    fn freshness_window_is_read_in_seconds() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WISHLIST_INIT_DATA_MAX_AGE_SECS", "86400"));
        let config = config(&pairs).unwrap();
        assert_eq!(config.init_data_max_age, Some(Duration::days(1)));
    }
}
