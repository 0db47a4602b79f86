//! Webhook Dispatcher: fan business events out to subscribed endpoints.
//!
//! For one event every active subscription is called concurrently (bounded
//! by `max_concurrent_webhooks`; results keep registry order). Each
//! subscription gets up to `max_retries` sequential attempts with a pause
//! chosen by the [`RetryPolicy`]. Every attempt is appended to the webhook
//! log. The retry loop stops early on success, on cancellation, when the
//! overall deadline passes, and (when `retry_permanent_errors` is off) after
//! a permanent or configuration failure.
//!
//! Subscriptions are never disabled automatically, however often they fail.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_core::retry::{FixedDelay, RetryPolicy};
use courier_core::signing::sign_payload;
use courier_core::types::DbId;
use courier_db::models::webhook::{truncate_response_body, NewWebhookLog, WebhookConfig};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::processor::{env_parse, env_secs};
use crate::store::{StoreResult, WebhookLogStore, WebhookStore};

pub mod error;
pub mod transport;

pub use error::{DeliveryError, ErrorClass};
pub use transport::{HttpTransport, WebhookRequest, WebhookResponse, WebhookTransport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WebhookDispatchConfig {
    /// Upper bound for a single HTTP attempt.
    pub attempt_timeout: Duration,
    /// Upper bound for one whole `dispatch` call, retries included.
    pub overall_deadline: Duration,
    pub max_concurrent_webhooks: usize,
    /// Keep retrying after permanent and configuration failures.
    pub retry_permanent_errors: bool,
}

impl Default for WebhookDispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            overall_deadline: Duration::from_secs(60),
            max_concurrent_webhooks: 16,
            retry_permanent_errors: true,
        }
    }
}

impl WebhookDispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                       | Default |
    /// |--------------------------------|---------|
    /// | `WEBHOOK_ATTEMPT_TIMEOUT_SECS` | `10`    |
    /// | `WEBHOOK_DEADLINE_SECS`        | `60`    |
    /// | `WEBHOOK_MAX_CONCURRENCY`      | `16`    |
    /// | `WEBHOOK_RETRY_PERMANENT`      | `true`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            attempt_timeout: env_secs("WEBHOOK_ATTEMPT_TIMEOUT_SECS")
                .unwrap_or(defaults.attempt_timeout),
            overall_deadline: env_secs("WEBHOOK_DEADLINE_SECS")
                .unwrap_or(defaults.overall_deadline),
            max_concurrent_webhooks: env_parse::<usize>("WEBHOOK_MAX_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_webhooks),
            retry_permanent_errors: env_parse("WEBHOOK_RETRY_PERMANENT")
                .unwrap_or(defaults.retry_permanent_errors),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResult {
    pub webhook_id: DbId,
    pub url: String,
    pub status: WebhookStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Number of subscriptions the event was sent to.
    pub dispatched: usize,
    pub results: Vec<WebhookResult>,
}

/// Serialize and sign one envelope. The signature covers exactly the bytes
/// that are sent.
fn build_request<T: Serialize>(
    webhook: &WebhookConfig,
    event_type: &str,
    envelope: &T,
) -> Result<WebhookRequest, DeliveryError> {
    let body = serde_json::to_vec(envelope).map_err(|e| {
        DeliveryError::Configuration(format!("Envelope could not be serialized: {e}"))
    })?;
    Ok(WebhookRequest {
        url: webhook.url.clone(),
        event_type: event_type.to_string(),
        signature: webhook.secret.as_deref().map(|s| sign_payload(s, &body)),
        body,
    })
}

/// Why the retry loop for one subscription stopped without success.
enum Stop {
    Cancelled,
    DeadlineExceeded,
}

impl Stop {
    fn describe(&self, last_error: Option<&str>) -> String {
        let reason = match self {
            Self::Cancelled => "dispatch cancelled",
            Self::DeadlineExceeded => "overall deadline exceeded",
        };
        match last_error {
            Some(last) => format!("{reason} (last error: {last})"),
            None => reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookDispatcher
// ---------------------------------------------------------------------------

pub struct WebhookDispatcher {
    webhooks: Arc<dyn WebhookStore>,
    logs: Arc<dyn WebhookLogStore>,
    transport: Arc<dyn WebhookTransport>,
    retry_policy: Arc<dyn RetryPolicy>,
    config: WebhookDispatchConfig,
    /// Parent of every dispatch's cancellation token (process shutdown).
    shutdown: CancellationToken,
}

impl WebhookDispatcher {
    pub fn new(
        webhooks: Arc<dyn WebhookStore>,
        logs: Arc<dyn WebhookLogStore>,
        transport: Arc<dyn WebhookTransport>,
        config: WebhookDispatchConfig,
    ) -> Self {
        Self {
            webhooks,
            logs,
            transport,
            retry_policy: Arc::new(FixedDelay),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the default [`FixedDelay`] policy.
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Stop in-flight retry loops when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Send `event_type` to every active subscription.
    pub async fn dispatch(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
        notification_id: Option<DbId>,
    ) -> StoreResult<DispatchReport> {
        self.dispatch_with_cancel(event_type, payload, notification_id, &self.shutdown.child_token())
            .await
    }

    pub async fn dispatch_with_cancel(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
        notification_id: Option<DbId>,
        cancel: &CancellationToken,
    ) -> StoreResult<DispatchReport> {
        let webhooks = self.webhooks.list_active_for_event(event_type).await?;
        if webhooks.is_empty() {
            tracing::debug!(event_type, "No webhooks subscribed to event");
            return Ok(DispatchReport::default());
        }

        let deadline = Instant::now() + self.config.overall_deadline;
        // Built up front so the stream holds plain futures, which keeps the
        // whole dispatch future `Send`.
        let deliveries: Vec<_> = webhooks
            .iter()
            .map(|webhook| {
                self.deliver_to(webhook, event_type, payload, notification_id, deadline, cancel)
            })
            .collect();
        let results: Vec<WebhookResult> = stream::iter(deliveries)
            .buffered(self.config.max_concurrent_webhooks.max(1))
            .collect()
            .await;

        let succeeded = results
            .iter()
            .filter(|r| r.status == WebhookStatus::Success)
            .count();
        tracing::info!(
            event_type,
            dispatched = results.len(),
            succeeded,
            "Webhook dispatch completed"
        );

        Ok(DispatchReport {
            dispatched: results.len(),
            results,
        })
    }

    /// Send a single event to one subscription, ignoring its event filter
    /// and active flag. Used by the admin "test webhook" action.
    pub async fn deliver_one(
        &self,
        webhook: &WebhookConfig,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> WebhookResult {
        let deadline = Instant::now() + self.config.overall_deadline;
        let cancel = self.shutdown.child_token();
        self.deliver_to(webhook, event_type, payload, None, deadline, &cancel)
            .await
    }

    fn stop_reason(&self, cancel: &CancellationToken, deadline: Instant) -> Option<Stop> {
        if cancel.is_cancelled() {
            Some(Stop::Cancelled)
        } else if Instant::now() >= deadline {
            Some(Stop::DeadlineExceeded)
        } else {
            None
        }
    }

    async fn deliver_to(
        &self,
        webhook: &WebhookConfig,
        event_type: &str,
        payload: &serde_json::Value,
        notification_id: Option<DbId>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> WebhookResult {
        let max_attempts = u32::try_from(webhook.max_retries).unwrap_or(1).max(1);
        let base_delay = Duration::from_secs(u64::try_from(webhook.retry_delay_seconds).unwrap_or(0));

        let mut attempts = 0;
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            if let Some(stop) = self.stop_reason(cancel, deadline) {
                last_error = Some(stop.describe(last_error.as_deref()));
                break;
            }
            attempts = attempt;

            let envelope = serde_json::json!({
                "event": event_type,
                "timestamp": Utc::now().to_rfc3339(),
                "data": payload,
            });
            let outcome = match build_request(webhook, event_type, &envelope) {
                Ok(request) => {
                    let timeout = self
                        .config
                        .attempt_timeout
                        .min(deadline.saturating_duration_since(Instant::now()));
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        sent = tokio::time::timeout(timeout, self.transport.send(&request)) => {
                            Some(match sent {
                                Ok(Ok(response)) if response.is_success() => Ok(response),
                                Ok(Ok(response)) => Err(DeliveryError::Status {
                                    status: response.status,
                                    body: response.body,
                                }),
                                Ok(Err(e)) => Err(e),
                                Err(_) => Err(DeliveryError::Timeout),
                            })
                        }
                    }
                }
                Err(e) => Some(Err(e)),
            };

            self.append_log(webhook, event_type, notification_id, envelope, attempt, &outcome)
                .await;

            match outcome {
                Some(Ok(response)) => {
                    tracing::info!(
                        webhook_id = webhook.id,
                        event_type,
                        attempt,
                        status_code = response.status,
                        "Webhook delivered"
                    );
                    if let Err(e) = self.webhooks.record_success(webhook.id, Utc::now()).await {
                        tracing::warn!(webhook_id = webhook.id, error = %e, "Failed to update webhook counters");
                    }
                    return WebhookResult {
                        webhook_id: webhook.id,
                        url: webhook.url.clone(),
                        status: WebhookStatus::Success,
                        attempts,
                        error: None,
                    };
                }
                Some(Err(e)) => {
                    let class = e.class();
                    if class == ErrorClass::Configuration {
                        tracing::error!(
                            webhook_id = webhook.id,
                            url = %webhook.url,
                            error = %e,
                            "Webhook is misconfigured"
                        );
                    } else {
                        tracing::warn!(
                            webhook_id = webhook.id,
                            event_type,
                            attempt,
                            max_attempts,
                            status_code = e.status_code(),
                            class = ?class,
                            error = %e,
                            "Webhook attempt failed"
                        );
                    }
                    last_error = Some(e.to_string());
                    if !self.config.retry_permanent_errors && class != ErrorClass::Transient {
                        break;
                    }
                }
                None => {
                    last_error = Some(Stop::Cancelled.describe(last_error.as_deref()));
                    break;
                }
            }

            if attempt < max_attempts {
                let delay = self.retry_policy.delay_after(attempt, base_delay);
                let wake = (Instant::now() + delay).min(deadline);
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(wake) => {}
                }
            }
        }

        tracing::error!(
            webhook_id = webhook.id,
            event_type,
            attempts,
            error = last_error.as_deref().unwrap_or("unknown"),
            "Webhook delivery failed"
        );
        if let Err(e) = self.webhooks.record_failure(webhook.id).await {
            tracing::warn!(webhook_id = webhook.id, error = %e, "Failed to update webhook counters");
        }
        WebhookResult {
            webhook_id: webhook.id,
            url: webhook.url.clone(),
            status: WebhookStatus::Failed,
            attempts,
            error: last_error,
        }
    }

    async fn append_log(
        &self,
        webhook: &WebhookConfig,
        event_type: &str,
        notification_id: Option<DbId>,
        envelope: serde_json::Value,
        attempt: u32,
        outcome: &Option<Result<WebhookResponse, DeliveryError>>,
    ) {
        let (status_code, response_body, error_message) = match outcome {
            Some(Ok(response)) => (Some(response.status), Some(response.body.as_str()), None),
            Some(Err(e)) => (e.status_code(), e.response_body(), Some(e.to_string())),
            None => (None, None, Some("dispatch cancelled".to_string())),
        };
        let entry = NewWebhookLog {
            webhook_id: webhook.id,
            event_type: event_type.to_string(),
            notification_id,
            payload: envelope,
            status_code: status_code.map(i32::from),
            response_body: response_body.map(truncate_response_body),
            error_message,
            success: matches!(outcome, Some(Ok(_))),
            attempt_number: i32::try_from(attempt).unwrap_or(i32::MAX),
        };
        if let Err(e) = self.logs.append(&entry).await {
            tracing::warn!(webhook_id = webhook.id, attempt, error = %e, "Failed to append webhook log");
        }
    }
}

#[cfg(test)]
mod tests;
