use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use wishlist_types::models::TelegramUser;

type HmacSha256 = Hmac<Sha256>;

/// Key for deriving the per-application secret from the bot token.
const SECRET_KEY_LABEL: &[u8] = b"WebAppData";

const HASH_FIELD: &str = "hash";
const USER_FIELD: &str = "user";
const AUTH_DATE_FIELD: &str = "auth_date";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InitDataError {
    #[error("init data is empty")]
    Empty,
    #[error("init data is not a valid query string")]
    MalformedEncoding,
    #[error("init data has no hash field")]
    MissingHash,
    #[error("init data signature does not match")]
    SignatureMismatch,
    #[error("init data user field is missing or not a valid profile")]
    MalformedUser,
}

/// A payload whose signature checked out.
#[derive(Debug, Clone)]
pub struct VerifiedInitData {
    pub user: TelegramUser,
    /// Issuance time in unix seconds. Signed, but not checked here.
    pub auth_date: Option<i64>,
}

/// Verify a query-string encoded init data payload against the bot token.
pub fn validate_init_data(
    init_data: &str,
    bot_token: &str,
) -> Result<VerifiedInitData, InitDataError> {
    if init_data.is_empty() {
        return Err(InitDataError::Empty);
    }

    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(init_data).map_err(|_| InitDataError::MalformedEncoding)?;
    if pairs.is_empty() {
        return Err(InitDataError::Empty);
    }

    let hash = field(&pairs, HASH_FIELD).ok_or(InitDataError::MissingHash)?;
    let check = data_check_string(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    if !signature_matches(&check, bot_token, hash) {
        return Err(InitDataError::SignatureMismatch);
    }

    let user = field(&pairs, USER_FIELD)
        .and_then(|raw| serde_json::from_str::<TelegramUser>(raw).ok())
        .ok_or(InitDataError::MalformedUser)?;
    let auth_date = field(&pairs, AUTH_DATE_FIELD).and_then(|raw| raw.parse().ok());

    Ok(VerifiedInitData { user, auth_date })
}

/// Canonical check string: every `key=value` except `hash`, sorted
/// byte-wise and joined with `\n`.
pub fn data_check_string<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut lines: Vec<String> = pairs
        .into_iter()
        .filter(|(key, _)| *key != HASH_FIELD)
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    lines.sort_unstable();
    lines.join("\n")
}

/// Lowercase hex HMAC-SHA256 of `check` under the secret derived from `bot_token`.
pub fn sign(check: &str, bot_token: &str) -> String {
    let mut mac = keyed(&derive_secret(bot_token));
    mac.update(check.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Encode `fields` as a query string with a trailing `hash`, the way the host
/// client does. Any `hash` already present in `fields` is replaced.
pub fn sign_init_data(
    fields: &[(&str, &str)],
    bot_token: &str,
) -> Result<String, serde_urlencoded::ser::Error> {
    let hash = sign(&data_check_string(fields.iter().copied()), bot_token);

    let mut pairs: Vec<(&str, &str)> = fields
        .iter()
        .copied()
        .filter(|(key, _)| *key != HASH_FIELD)
        .collect();
    pairs.push((HASH_FIELD, &hash));

    serde_urlencoded::to_string(pairs)
}

fn derive_secret(bot_token: &str) -> Vec<u8> {
    let mut mac = keyed(SECRET_KEY_LABEL);
    mac.update(bot_token.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn keyed(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

fn signature_matches(check: &str, bot_token: &str, hash: &str) -> bool {
    // Only the lowercase hex form is ever produced, so anything else is a mismatch
    // even though hex::decode would accept it.
    let lowercase_hex = hash.len() == 64
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !lowercase_hex {
        return false;
    }
    let Ok(expected) = hex::decode(hash) else {
        return false;
    };

    let mut mac = keyed(&derive_secret(bot_token));
    mac.update(check.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn field<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
