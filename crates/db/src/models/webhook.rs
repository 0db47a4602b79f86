//! Webhook subscription and delivery-log models and DTOs.

use std::fmt;

use courier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;
use validator::Validate;

/// Default attempt budget for new subscriptions.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Default fixed pause between attempts.
pub const DEFAULT_RETRY_DELAY_SECONDS: i32 = 2;

/// Stored response bodies are cut to this many characters.
pub const RESPONSE_BODY_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// WebhookConfig
// ---------------------------------------------------------------------------

/// A row from the `webhooks` table.
///
/// The signing secret is never serialized; responses carry `has_secret`
/// instead. `Debug` redacts it as well so it cannot leak into logs.
#[derive(Clone, PartialEq, FromRow, Serialize)]
pub struct WebhookConfig {
    pub id: DbId,
    pub name: String,
    pub url: String,
    #[serde(rename = "has_secret", serialize_with = "serialize_has_secret")]
    pub secret: Option<String>,
    pub events: Vec<String>,
    pub is_active: bool,
    pub max_retries: i32,
    pub retry_delay_seconds: i32,
    pub total_calls: i64,
    pub failed_calls: i64,
    pub last_triggered_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookConfig {
    /// Whether this subscription should receive `event_type`.
    pub fn accepts(&self, event_type: &str) -> bool {
        self.is_active && self.events.iter().any(|e| e == event_type)
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("events", &self.events)
            .field("is_active", &self.is_active)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_seconds", &self.retry_delay_seconds)
            .field("total_calls", &self.total_calls)
            .field("failed_calls", &self.failed_calls)
            .field("last_triggered_at", &self.last_triggered_at)
            .finish()
    }
}

fn serialize_has_secret<S: Serializer>(
    secret: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(secret.is_some())
}

/// DTO for creating a new webhook subscription.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWebhook {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(url)]
    pub url: String,
    pub secret: Option<String>,
    /// Event type names to subscribe to.
    #[validate(length(min = 1))]
    pub events: Vec<String>,
    pub is_active: Option<bool>,
    #[validate(range(min = 1, max = 20))]
    pub max_retries: Option<i32>,
    #[validate(range(min = 0, max = 3600))]
    pub retry_delay_seconds: Option<i32>,
}

/// DTO for updating a webhook subscription. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateWebhook {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(url)]
    pub url: Option<String>,
    /// New signing secret. An empty string removes the secret.
    pub secret: Option<String>,
    #[validate(length(min = 1))]
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
    #[validate(range(min = 1, max = 20))]
    pub max_retries: Option<i32>,
    #[validate(range(min = 0, max = 3600))]
    pub retry_delay_seconds: Option<i32>,
}

impl UpdateWebhook {
    /// `None` keeps the current secret, `Some(None)` clears it.
    pub fn secret_change(&self) -> Option<Option<&str>> {
        self.secret
            .as_deref()
            .map(|s| (!s.is_empty()).then_some(s))
    }
}

// ---------------------------------------------------------------------------
// WebhookLog
// ---------------------------------------------------------------------------

/// A row from the `webhook_logs` table (append-only).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct WebhookLog {
    pub id: DbId,
    pub webhook_id: DbId,
    pub event_type: String,
    pub notification_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub success: bool,
    pub attempt_number: i32,
    pub created_at: Timestamp,
}

/// One delivery attempt to append to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookLog {
    pub webhook_id: DbId,
    pub event_type: String,
    pub notification_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub success: bool,
    pub attempt_number: i32,
}

/// Cut `body` to [`RESPONSE_BODY_LIMIT`] characters on a char boundary.
pub fn truncate_response_body(body: &str) -> String {
    match body.char_indices().nth(RESPONSE_BODY_LIMIT) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn webhook(secret: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            id: 1,
            name: "crm".into(),
            url: "https://crm.example.com/hook".into(),
            secret: secret.map(str::to_string),
            events: vec!["quote.accepted".into()],
            is_active: true,
            max_retries: 3,
            retry_delay_seconds: 2,
            total_calls: 0,
            failed_calls: 0,
            last_triggered_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn secret_never_serialized() {
        let json = serde_json::to_value(webhook(Some("whsec_topsecret"))).unwrap();
        assert_eq!(json["has_secret"], true);
        assert!(json.get("secret").is_none());
        assert!(!json.to_string().contains("whsec_topsecret"));
    }

    #[test]
    fn empty_secret_clears_and_absent_secret_keeps() {
        let keep = UpdateWebhook::default();
        assert_eq!(keep.secret_change(), None);

        let clear = UpdateWebhook {
            secret: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(clear.secret_change(), Some(None));

        let rotate = UpdateWebhook {
            secret: Some("whsec_new".into()),
            ..Default::default()
        };
        assert_eq!(rotate.secret_change(), Some(Some("whsec_new")));
    }

    #[test]
    fn secret_redacted_in_debug() {
        let printed = format!("{:?}", webhook(Some("whsec_topsecret")));
        assert!(!printed.contains("whsec_topsecret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn accepts_only_subscribed_events_when_active() {
        let mut wh = webhook(None);
        assert!(wh.accepts("quote.accepted"));
        assert!(!wh.accepts("quote.rejected"));
        wh.is_active = false;
        assert!(!wh.accepts("quote.accepted"));
    }

    #[test]
    fn create_dto_rejects_bad_url_and_zero_retries() {
        let dto = CreateWebhook {
            name: "crm".into(),
            url: "not a url".into(),
            secret: None,
            events: vec!["quote.accepted".into()],
            is_active: None,
            max_retries: Some(0),
            retry_delay_seconds: None,
        };
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("url"));
        assert!(fields.contains_key("max_retries"));
    }

    #[test]
    fn response_body_truncated_on_char_boundary() {
        let long = "é".repeat(RESPONSE_BODY_LIMIT + 10);
        let cut = truncate_response_body(&long);
        assert_eq!(cut.chars().count(), RESPONSE_BODY_LIMIT);

        assert_eq!(truncate_response_body("ok"), "ok");
    }
}
