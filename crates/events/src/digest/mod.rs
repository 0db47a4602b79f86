//! Digest Aggregator: per-user summary emails of unread notifications.
//!
//! On every tick, users whose digest time matches the current UTC minute
//! (and weekday, for weekly digests) get one email grouping their unread
//! notifications from the last 24 hours. The slot is claimed through
//! `digest_last_sent_at` first, so overlapping runs never double-send.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DurationRound, TimeDelta, Utc};
use courier_core::channels::Channel;
use courier_core::digest::{Digest, DigestEntry, DIGEST_GROUP_LIMIT, DIGEST_WINDOW_HOURS};
use courier_core::priority::Priority;
use courier_core::types::{DbId, Timestamp};
use courier_db::models::preference::NotificationPreference;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::delivery::{ChannelSenders, OutboundMessage};
use crate::store::{NotificationStore, PreferenceStore, StoreResult};

pub mod template;

pub use template::{DigestTemplates, RenderedDigest, TemplateError};

/// Default cadence of [`DigestAggregator::run`].
pub const DEFAULT_DIGEST_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestStatus {
    Sent,
    /// Nothing unread in the window; no email is sent.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestResult {
    pub user_id: DbId,
    pub status: DigestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub digests_sent: usize,
    pub results: Vec<DigestResult>,
}

pub struct DigestAggregator {
    preferences: Arc<dyn PreferenceStore>,
    notifications: Arc<dyn NotificationStore>,
    senders: ChannelSenders,
    templates: DigestTemplates,
    interval: Duration,
}

impl DigestAggregator {
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        notifications: Arc<dyn NotificationStore>,
        senders: ChannelSenders,
        interval: Duration,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            preferences,
            notifications,
            senders,
            templates: DigestTemplates::new()?,
            interval,
        })
    }

    /// Send every digest due in the minute containing `now`.
    pub async fn run_once(&self, now: Timestamp) -> StoreResult<DigestReport> {
        let slot_start = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
        let mut report = DigestReport::default();

        for pref in self.preferences.list_digest_enabled().await? {
            if !pref.schedule().is_due(now) {
                continue;
            }
            let result = self.process_user(&pref, slot_start, now).await;
            let Some(result) = result else { continue };
            if result.status == DigestStatus::Sent {
                report.digests_sent += 1;
            }
            report.results.push(result);
        }

        if !report.results.is_empty() {
            tracing::info!(
                sent = report.digests_sent,
                users = report.results.len(),
                "Processed digests"
            );
        }
        Ok(report)
    }

    /// `None` when another run already owns this user's slot.
    async fn process_user(
        &self,
        pref: &NotificationPreference,
        slot_start: Timestamp,
        now: Timestamp,
    ) -> Option<DigestResult> {
        let user_id = pref.user_id;
        let failed = |error: String| {
            tracing::error!(user_id, error = %error, "Failed to send digest");
            Some(DigestResult {
                user_id,
                status: DigestStatus::Failed,
                notification_count: None,
                error: Some(error),
            })
        };

        match self.preferences.claim_digest(user_id, slot_start, now).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(user_id, "Digest slot already claimed");
                return None;
            }
            Err(e) => return failed(e.to_string()),
        }

        let since = now - TimeDelta::hours(DIGEST_WINDOW_HOURS);
        let unread = match self.notifications.list_unread_since(user_id, since).await {
            Ok(unread) => unread,
            Err(e) => return failed(e.to_string()),
        };
        if unread.is_empty() {
            return Some(DigestResult {
                user_id,
                status: DigestStatus::Skipped,
                notification_count: Some(0),
                error: None,
            });
        }

        let count = unread.len();
        let entries = unread
            .into_iter()
            .map(|n| DigestEntry {
                id: n.id,
                category: n.category,
                title: n.title,
                message: n.message,
                priority: n.priority,
                created_at: n.created_at,
            })
            .collect();
        let digest = Digest::build(entries, DIGEST_GROUP_LIMIT);

        let rendered = match self.templates.render(&digest, now) {
            Ok(rendered) => rendered,
            Err(e) => return failed(e.to_string()),
        };
        let Some(email) = self.senders.get(Channel::Email) else {
            return failed("email channel is not configured".to_string());
        };
        let message = OutboundMessage {
            user_id,
            subject: rendered.subject,
            body: rendered.text,
            html: Some(rendered.html),
            priority: digest
                .groups
                .first()
                .map(|g| g.top_priority)
                .unwrap_or(Priority::Normal),
            metadata: serde_json::json!({ "digest": true, "notification_count": count }),
            notification: None,
        };
        if let Err(e) = email.send(&message).await {
            return failed(e.to_string());
        }

        tracing::info!(user_id, notification_count = count, "Digest sent");
        Some(DigestResult {
            user_id,
            status: DigestStatus::Sent,
            notification_count: Some(count),
            error: None,
        })
    }

    /// Tick every interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Digest aggregator cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        tracing::error!(error = %e, "Failed to process digests");
                    }
                }
            }
        }
    }
}
