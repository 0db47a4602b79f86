//! Queue Processor: scheduled dispatch and bounded retry of notifications.
//!
//! Each [`QueueProcessor::run_once`] invocation makes two passes:
//!
//! 1. **Due** -- claim notifications whose `scheduled_for` has passed and
//!    dispatch every requested channel.
//! 2. **Retry** -- claim notifications with failed channels that are older
//!    than the cooldown and still have retry passes left, and re-dispatch
//!    only the failed channels. A notification that exhausts its passes is
//!    dead-lettered.
//!
//! Both passes select through claim leases, so overlapping invocations (the
//! worker loop and the HTTP trigger, or two workers) never dispatch the same
//! row twice. A single notification failing never aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier_core::types::{DbId, Timestamp};
use courier_db::models::notification::{DeliveryUpdate, Notification};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{DeliveryDispatcher, DEFAULT_SEND_TIMEOUT};
use crate::store::{NotificationStore, StoreResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub due_batch_size: i64,
    pub retry_batch_size: i64,
    /// Minimum notification age before its failed channels are retried.
    pub retry_cooldown: Duration,
    /// Retry passes before a notification is dead-lettered.
    pub max_delivery_retries: i16,
    pub claim_lease: Duration,
    /// Cadence of [`QueueProcessor::run`].
    pub interval: Duration,
    pub send_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            due_batch_size: 100,
            retry_batch_size: 50,
            retry_cooldown: Duration::from_secs(300),
            max_delivery_retries: 5,
            claim_lease: Duration::from_secs(120),
            interval: Duration::from_secs(60),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                     | Default |
    /// |------------------------------|---------|
    /// | `QUEUE_DUE_BATCH`            | `100`   |
    /// | `QUEUE_RETRY_BATCH`          | `50`    |
    /// | `QUEUE_RETRY_COOLDOWN_SECS`  | `300`   |
    /// | `QUEUE_MAX_DELIVERY_RETRIES` | `5`     |
    /// | `QUEUE_CLAIM_LEASE_SECS`     | `120`   |
    /// | `QUEUE_INTERVAL_SECS`        | `60`    |
    /// | `CHANNEL_SEND_TIMEOUT_SECS`  | `30`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            due_batch_size: env_parse("QUEUE_DUE_BATCH").unwrap_or(defaults.due_batch_size),
            retry_batch_size: env_parse("QUEUE_RETRY_BATCH").unwrap_or(defaults.retry_batch_size),
            retry_cooldown: env_secs("QUEUE_RETRY_COOLDOWN_SECS")
                .unwrap_or(defaults.retry_cooldown),
            max_delivery_retries: env_parse("QUEUE_MAX_DELIVERY_RETRIES")
                .unwrap_or(defaults.max_delivery_retries),
            claim_lease: env_secs("QUEUE_CLAIM_LEASE_SECS").unwrap_or(defaults.claim_lease),
            interval: env_secs("QUEUE_INTERVAL_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.interval),
            send_timeout: env_secs("CHANNEL_SEND_TIMEOUT_SECS").unwrap_or(defaults.send_timeout),
        }
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

pub(crate) fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

/// `now + duration` for chrono timestamps, saturating on overflow.
fn after(now: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

fn before(now: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Delivered,
    /// Some channels failed; they stay eligible for the retry pass.
    PartiallyFailed,
    /// The last retry pass was consumed without full delivery.
    DeadLettered,
    /// Recording the outcome failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    pub id: DbId,
    pub status: ProcessStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub results: Vec<ProcessResult>,
}

// ---------------------------------------------------------------------------
// QueueProcessor
// ---------------------------------------------------------------------------

pub struct QueueProcessor {
    store: Arc<dyn NotificationStore>,
    dispatcher: Arc<DeliveryDispatcher>,
    config: ProcessorConfig,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        dispatcher: Arc<DeliveryDispatcher>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run both passes once. Only a failed claim is returned as an error.
    pub async fn run_once(&self, now: Timestamp) -> StoreResult<ProcessReport> {
        let lease_until = after(now, self.config.claim_lease);
        let mut results = Vec::new();

        let due = self
            .store
            .claim_due(now, lease_until, self.config.due_batch_size)
            .await?;
        for notification in &due {
            results.push(self.dispatch_claimed(notification, false, now).await);
        }

        let failed = self
            .store
            .claim_failed(
                now,
                lease_until,
                before(now, self.config.retry_cooldown),
                self.config.max_delivery_retries,
                self.config.retry_batch_size,
            )
            .await?;
        for notification in &failed {
            results.push(self.dispatch_claimed(notification, true, now).await);
        }

        if !results.is_empty() {
            tracing::info!(
                due = due.len(),
                retried = failed.len(),
                "Processed notification queue"
            );
        }

        Ok(ProcessReport {
            processed: results.len(),
            results,
        })
    }

    /// Claim one notification by id and dispatch it immediately.
    ///
    /// Returns `None` when the row is not due or another invocation holds it.
    pub async fn dispatch_now(
        &self,
        id: DbId,
        now: Timestamp,
    ) -> StoreResult<Option<ProcessResult>> {
        let lease_until = after(now, self.config.claim_lease);
        match self.store.claim_by_id(id, now, lease_until).await? {
            Some(notification) => Ok(Some(self.dispatch_claimed(&notification, false, now).await)),
            None => Ok(None),
        }
    }

    async fn dispatch_claimed(
        &self,
        notification: &Notification,
        retry: bool,
        now: Timestamp,
    ) -> ProcessResult {
        let failed_only = notification.delivery_status.failed_channels();
        let only = retry.then_some(&failed_only);
        let report = self.dispatcher.deliver(notification, only).await;

        let exhausted = retry && notification.retry_count + 1 >= self.config.max_delivery_retries;
        let dead_lettered_at = (!report.is_delivered() && exhausted).then_some(now);

        let status = match (report.is_delivered(), dead_lettered_at.is_some()) {
            (true, _) => ProcessStatus::Delivered,
            (false, true) => ProcessStatus::DeadLettered,
            (false, false) => ProcessStatus::PartiallyFailed,
        };

        let update = DeliveryUpdate {
            delivery_status: report.delivery_status,
            delivered_at: report.delivered_at,
            consumed_retry: retry,
            dead_lettered_at,
        };
        if let Err(e) = self.store.record_delivery(notification.id, &update).await {
            tracing::error!(
                notification_id = notification.id,
                error = %e,
                "Failed to record delivery outcome"
            );
            return ProcessResult {
                id: notification.id,
                status: ProcessStatus::Error,
            };
        }

        if status == ProcessStatus::DeadLettered {
            tracing::warn!(
                notification_id = notification.id,
                retries = notification.retry_count + 1,
                failed_channels = ?update.delivery_status.failed_channels(),
                "Notification dead-lettered after exhausting delivery retries"
            );
        }

        ProcessResult {
            id: notification.id,
            status,
        }
    }

    /// Run [`run_once`](Self::run_once) on a fixed interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        tracing::info!(interval_secs = self.config.interval.as_secs(), "Queue processor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queue processor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        tracing::error!(error = %e, "Queue processing pass failed");
                    }
                }
            }
        }
    }
}
