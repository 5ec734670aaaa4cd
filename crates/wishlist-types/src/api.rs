use serde::{Deserialize, Serialize};

use crate::models::User;

// -- Session claims --

/// Session token claims, shared by the REST middleware and the live-view
/// upgrade. `sub` is the host client's numeric user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramAuthRequest {
    #[serde(default)]
    pub init_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

// -- Items --

#[derive(Debug, Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<IncomingItem>,
}

/// One entry of an edit batch. Entries without an `id` are new items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingItem {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub links: Option<Vec<String>>,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
}

impl IncomingItem {
    pub fn text(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or_default()
    }

    pub fn links(&self) -> &[String] {
        self.links.as_deref().unwrap_or_default()
    }

    pub fn photos(&self) -> &[String] {
        self.photos.as_deref().unwrap_or_default()
    }

    /// An entry with no text, no links and no photos carries nothing worth storing.
    pub fn is_blank(&self) -> bool {
        self.text().is_empty() && self.links().is_empty() && self.photos().is_empty()
    }
}

// -- Reservations --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub reserved: bool,
    /// Only present on a reserve call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_reserved: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_item_tolerates_nulls_and_missing_fields() {
        let item: IncomingItem =
            serde_json::from_str(r#"{"text": null, "links": null}"#).unwrap();
        assert!(item.id.is_none());
        assert!(item.is_blank());

        let item: IncomingItem = serde_json::from_str(r#"{"id": 4, "photos": ["a.jpg"]}"#).unwrap();
        assert_eq!(item.id, Some(4));
        assert!(!item.is_blank());
    }

    #[test]
    fn whitespace_only_text_is_blank() {
        let item = IncomingItem {
            text: Some("   ".into()),
            ..Default::default()
        };
        assert!(item.is_blank());
    }

    #[test]
    fn cancel_response_omits_already_reserved() {
        let cancelled = ReservationResponse { reserved: false, already_reserved: None };
        assert_eq!(serde_json::to_string(&cancelled).unwrap(), r#"{"reserved":false}"#);

        let repeat = ReservationResponse { reserved: true, already_reserved: Some(true) };
        assert_eq!(
            serde_json::to_string(&repeat).unwrap(),
            r#"{"reserved":true,"alreadyReserved":true}"#
        );
    }

    #[test]
    fn auth_request_reads_camel_case() {
        let req: TelegramAuthRequest = serde_json::from_str(r#"{"initData": "a=b"}"#).unwrap();
        assert_eq!(req.init_data.as_deref(), Some("a=b"));
    }
}
