//! Push delivery through an HTTP push gateway.
//!
//! The gateway receives `{"to", "title", "body", "priority", "data"}` as
//! JSON; device tokens come from the recipient directory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::channels::Channel;
use serde::Serialize;

use super::{ChannelSender, OutboundMessage, SendError};
use crate::store::RecipientStore;

/// HTTP timeout for a single gateway call.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub gateway_url: String,
    /// Sent as a bearer token when present.
    pub gateway_token: Option<String>,
}

impl PushConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `PUSH_GATEWAY_URL` is not set.
    ///
    /// | Variable             | Required |
    /// |----------------------|----------|
    /// | `PUSH_GATEWAY_URL`   | yes      |
    /// | `PUSH_GATEWAY_TOKEN` | no       |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            gateway_url: std::env::var("PUSH_GATEWAY_URL").ok()?,
            gateway_token: std::env::var("PUSH_GATEWAY_TOKEN").ok(),
        })
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    priority: &'a str,
    data: &'a serde_json::Value,
}

pub struct PushGatewaySender {
    client: reqwest::Client,
    config: PushConfig,
    recipients: Arc<dyn RecipientStore>,
}

impl PushGatewaySender {
    pub fn new(
        config: PushConfig,
        recipients: Arc<dyn RecipientStore>,
    ) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| SendError::Build(e.to_string()))?;
        Ok(Self {
            client,
            config,
            recipients,
        })
    }
}

#[async_trait]
impl ChannelSender for PushGatewaySender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let token = self
            .recipients
            .find(message.user_id)
            .await?
            .and_then(|r| r.push_token)
            .ok_or(SendError::MissingAddress {
                channel: Channel::Push,
                user_id: message.user_id,
            })?;

        let mut request = self.client.post(&self.config.gateway_url).json(&PushRequest {
            to: &token,
            title: &message.subject,
            body: &message.body,
            priority: message.priority.as_str(),
            data: &message.metadata,
        });
        if let Some(gateway_token) = &self.config.gateway_token {
            request = request.bearer_auth(gateway_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SendError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(user_id = message.user_id, "Push notification accepted by gateway");
        Ok(())
    }
}
