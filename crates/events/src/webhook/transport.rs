//! HTTP transport for webhook callbacks.

use async_trait::async_trait;
use courier_core::signing::{EVENT_TYPE_HEADER, SIGNATURE_HEADER};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};

use super::error::DeliveryError;

pub const WEBHOOK_USER_AGENT: &str = concat!("courier-webhooks/", env!("CARGO_PKG_VERSION"));

/// One signed callback, ready to send.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub event_type: String,
    /// Exact serialized envelope; the signature covers these bytes.
    pub body: Vec<u8>,
    /// Hex HMAC-SHA256 of `body`, when the subscription has a secret.
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a request and returns whatever the endpoint answered. Non-2xx is
/// not an error at this level.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse, DeliveryError>;
}

/// `reqwest` transport. Timeouts are applied by the dispatcher.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .user_agent(WEBHOOK_USER_AGENT)
            .build()
            .map_err(|e| DeliveryError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| DeliveryError::Configuration(format!("{}: {e}", request.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::Configuration(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let mut builder = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, WEBHOOK_USER_AGENT)
            .header(EVENT_TYPE_HEADER, &request.event_type)
            .body(request.body.clone());
        if let Some(signature) = &request.signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(WebhookResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn request(url: &str) -> WebhookRequest {
        WebhookRequest {
            url: url.into(),
            event_type: "quote.accepted".into(),
            body: b"{}".to_vec(),
            signature: None,
        }
    }

    #[tokio::test]
    async fn invalid_url_is_configuration_error() {
        let transport = HttpTransport::new().unwrap();
        assert_matches!(
            transport.send(&request("not a url")).await,
            Err(DeliveryError::Configuration(_))
        );
        assert_matches!(
            transport.send(&request("ftp://example.com/hook")).await,
            Err(DeliveryError::Configuration(_))
        );
    }

    #[test]
    fn user_agent_carries_version() {
        assert!(WEBHOOK_USER_AGENT.starts_with("courier-webhooks/"));
    }
}
