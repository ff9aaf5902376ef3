//! Wire types for the Kivra API.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Response of the OAuth2 authorize call that starts a BankID challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthStart {
    /// Payload to encode in the QR code
    pub qr_code: String,
    /// Path to poll for the challenge outcome
    pub next_poll_url: String,
    /// Authorization code to exchange once the challenge completes
    pub code: String,
}

/// One poll of a pending challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Not resolved yet
    Pending,
    /// Signed in the BankID app
    Complete,
    /// The identity provider gave up waiting
    Expired,
    /// Refused or cancelled; carries the remote status string
    Failed(String),
}

impl PollState {
    /// Map the remote `status` field.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "pending" => Self::Pending,
            "complete" => Self::Complete,
            "expired" | "timeout" => Self::Expired,
            other => Self::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PollResponse {
    #[serde(default)]
    pub status: String,
}

/// Tokens returned by the OAuth2 token exchange.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    /// Bearer token for API calls
    pub access_token: String,
    /// JWT carrying the user id
    pub id_token: String,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant").finish_non_exhaustive()
    }
}

/// A receipt as listed by `receiptsV2`.
#[derive(Debug, Clone)]
pub struct ReceiptSummary {
    /// Receipt key
    pub key: String,
    /// Purchase date reduced to `YYYY-MM-DD`
    pub date: String,
    /// Store name
    pub store_name: String,
}

/// The full receipt listing.
#[derive(Debug, Clone)]
pub struct ReceiptListing {
    /// Total number of receipts reported by the service
    pub total: u64,
    /// Listed receipts, newest first
    pub items: Vec<ReceiptSummary>,
    /// The raw listing object, for archiving
    pub raw: Value,
}

/// A letter as listed by `contents`.
#[derive(Debug, Clone)]
pub struct LetterSummary {
    /// Content key
    pub key: String,
    /// Received date reduced to `YYYY-MM-DD`
    pub date: String,
    /// Sender name
    pub sender_name: String,
    /// The raw list entry, merged into the stored metadata
    pub raw: Value,
}

/// All letters across pages.
#[derive(Debug, Clone, Default)]
pub struct LetterListing {
    /// Letters, in listing order
    pub items: Vec<LetterSummary>,
    /// Raw list entries, for archiving
    pub raw: Vec<Value>,
}

/// One part of a letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LetterPart {
    /// Inline plain text
    Text(String),
    /// Inline HTML
    Html(String),
    /// A PDF file to download by key
    Pdf {
        /// File key
        file_key: String,
    },
    /// Anything else; skipped
    Unsupported(String),
}

/// Letter details from `/v1/content/{key}`.
#[derive(Debug, Clone)]
pub struct LetterContent {
    /// Parts in document order
    pub parts: Vec<LetterPart>,
    /// The raw details object
    pub raw: Value,
}

/// Reduce an ISO timestamp to its date.
///
/// ```
/// use kivra_sync_core::remote::types::format_date;
///
/// assert_eq!(format_date(Some("2024-03-01T12:30:00Z")), "2024-03-01");
/// assert_eq!(format_date(None), "unknown_date");
/// ```
#[must_use]
pub fn format_date(iso: Option<&str>) -> String {
    match iso {
        Some(s) if !s.is_empty() => s.split('T').next().unwrap_or(s).to_string(),
        _ => "unknown_date".to_string(),
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

impl ReceiptListing {
    /// Parse `data.receiptsV2` from a GraphQL response.
    pub fn from_graphql(data: &Value) -> Result<Self> {
        let raw = data
            .pointer("/data/receiptsV2")
            .cloned()
            .ok_or_else(|| Error::Protocol("missing data.receiptsV2".into()))?;

        let items: Vec<ReceiptSummary> = raw
            .get("list")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|entry| {
                        let key = entry.get("key").and_then(Value::as_str);
                        if key.is_none() {
                            tracing::warn!("Receipt missing key, skipping");
                        }
                        Some(ReceiptSummary {
                            key: key?.to_string(),
                            date: format_date(str_at(entry, "/purchaseDate")),
                            store_name: str_at(entry, "/store/name")
                                .unwrap_or("unknown_store")
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = raw
            .get("total")
            .and_then(Value::as_u64)
            .unwrap_or(items.len() as u64);

        Ok(Self { total, items, raw })
    }
}

/// One page of `contents`.
#[derive(Debug)]
pub(crate) struct LetterPage {
    pub items: Vec<Value>,
    pub exists_more: bool,
}

impl LetterPage {
    pub(crate) fn from_graphql(data: &Value) -> Result<Self> {
        let page = data
            .pointer("/data/contents")
            .ok_or_else(|| Error::Protocol("missing data.contents".into()))?;

        Ok(Self {
            items: page
                .get("list")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            exists_more: page
                .get("existsMore")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

impl LetterListing {
    /// Build from raw list entries collected across pages.
    #[must_use]
    pub fn from_entries(raw: Vec<Value>) -> Self {
        let items = raw
            .iter()
            .filter_map(|entry| {
                let Some(key) = entry.get("key").and_then(Value::as_str) else {
                    tracing::warn!("Letter missing key, skipping");
                    return None;
                };
                Some(LetterSummary {
                    key: key.to_string(),
                    date: format_date(str_at(entry, "/receivedAt")),
                    sender_name: str_at(entry, "/sender/name")
                        .unwrap_or("unknown_sender")
                        .to_string(),
                    raw: entry.clone(),
                })
            })
            .collect();

        Self { items, raw }
    }

    /// Number of listed letters.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.raw.len() as u64
    }
}

impl LetterContent {
    /// Parse the `/v1/content/{key}` response.
    #[must_use]
    pub fn from_json(raw: Value) -> Self {
        let parts = raw
            .get("parts")
            .and_then(Value::as_array)
            .map(|parts| parts.iter().map(LetterPart::from_json).collect())
            .unwrap_or_default();

        Self { parts, raw }
    }
}

impl LetterPart {
    fn from_json(part: &Value) -> Self {
        let content_type = part
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let body = || {
            part.get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match content_type {
            "text/plain" => Self::Text(body()),
            "text/html" => Self::Html(body()),
            "application/pdf" => match part.get("key").and_then(Value::as_str) {
                Some(key) => Self::Pdf {
                    file_key: key.to_string(),
                },
                None => Self::Unsupported("application/pdf without key".to_string()),
            },
            other => Self::Unsupported(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_poll_state_mapping() {
        assert_eq!(PollState::from_status("pending"), PollState::Pending);
        assert_eq!(PollState::from_status("complete"), PollState::Complete);
        assert_eq!(PollState::from_status("expired"), PollState::Expired);
        assert_eq!(
            PollState::from_status("user_cancel"),
            PollState::Failed("user_cancel".into())
        );
    }

    #[test]
    fn test_receipt_listing_parse() {
        let data = json!({
            "data": {"receiptsV2": {
                "total": 3,
                "list": [
                    {"key": "r1", "purchaseDate": "2024-05-01T10:00:00Z", "store": {"name": "ICA Maxi"}},
                    {"purchaseDate": "2024-05-02T10:00:00Z"},
                    {"key": "r3"}
                ]
            }}
        });

        let listing = ReceiptListing::from_graphql(&data).unwrap();
        assert_eq!(listing.total, 3);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].date, "2024-05-01");
        assert_eq!(listing.items[0].store_name, "ICA Maxi");
        assert_eq!(listing.items[1].store_name, "unknown_store");
        assert_eq!(listing.items[1].date, "unknown_date");
    }

    #[test]
    fn test_receipt_listing_missing_root() {
        let err = ReceiptListing::from_graphql(&json!({"data": {}})).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_letter_page_parse() {
        let data = json!({"data": {"contents": {
            "total": 250, "existsMore": true,
            "list": [{"key": "c1"}, {"key": "c2"}]
        }}});
        let page = LetterPage::from_graphql(&data).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.exists_more);
    }

    #[test]
    fn test_letter_listing_from_entries() {
        let listing = LetterListing::from_entries(vec![
            json!({"key": "c1", "receivedAt": "2024-01-02T08:00:00Z", "sender": {"name": "Skatteverket"}}),
            json!({"subject": "no key"}),
        ]);
        assert_eq!(listing.total(), 2);
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].sender_name, "Skatteverket");
        assert_eq!(listing.items[0].date, "2024-01-02");
    }

    #[test]
    fn test_letter_content_parts() {
        let content = LetterContent::from_json(json!({
            "parts": [
                {"content_type": "text/plain", "body": "Hej"},
                {"content_type": "text/html", "body": "<p>Hej</p>"},
                {"content_type": "application/pdf", "key": "f1"},
                {"content_type": "application/pdf"},
                {"content_type": "image/png"}
            ]
        }));

        assert_eq!(
            content.parts,
            vec![
                LetterPart::Text("Hej".into()),
                LetterPart::Html("<p>Hej</p>".into()),
                LetterPart::Pdf {
                    file_key: "f1".into()
                },
                LetterPart::Unsupported("application/pdf without key".into()),
                LetterPart::Unsupported("image/png".into()),
            ]
        );
    }
}
