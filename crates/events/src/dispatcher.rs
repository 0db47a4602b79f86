//! Delivery Dispatcher: one notification, every requested channel.
//!
//! Channels are attempted concurrently and isolated from each other: an
//! error, a timeout or a missing sender marks that channel `failed` and the
//! others still run. Channels already `success` are never re-sent.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use courier_core::channels::{Channel, ChannelStatus, DeliveryStatus};
use courier_core::types::Timestamp;
use courier_db::models::notification::Notification;
use futures::future::join_all;

use crate::delivery::{ChannelSenders, OutboundMessage};

/// Default upper bound for a single sender call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// The notification's status map with this dispatch merged in.
    pub delivery_status: DeliveryStatus,
    /// Error text per channel that failed in this dispatch.
    pub errors: BTreeMap<Channel, String>,
    /// Set iff every requested channel is now `success`.
    pub delivered_at: Option<Timestamp>,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

pub struct DeliveryDispatcher {
    senders: ChannelSenders,
    send_timeout: Duration,
}

impl DeliveryDispatcher {
    pub fn new(senders: ChannelSenders, send_timeout: Duration) -> Self {
        Self {
            senders,
            send_timeout,
        }
    }

    /// Send `notification` over its channels, restricted to `only` when
    /// given.
    pub async fn deliver(
        &self,
        notification: &Notification,
        only: Option<&BTreeSet<Channel>>,
    ) -> DeliveryReport {
        let message = OutboundMessage::from_notification(notification);
        let targets: Vec<Channel> = notification
            .channels
            .iter()
            .copied()
            .filter(|c| only.is_none_or(|subset| subset.contains(c)))
            .filter(|c| notification.delivery_status.get(*c) != ChannelStatus::Success)
            .collect();

        let outcomes = join_all(targets.into_iter().map(|channel| {
            let message = &message;
            async move { (channel, self.send_one(channel, message).await) }
        }))
        .await;

        let mut delivery_status = notification.delivery_status.clone();
        let mut errors = BTreeMap::new();
        for (channel, outcome) in outcomes {
            match outcome {
                Ok(()) => delivery_status.set(channel, ChannelStatus::Success),
                Err(error) => {
                    tracing::warn!(
                        notification_id = notification.id,
                        channel = %channel,
                        error = %error,
                        "Channel delivery failed"
                    );
                    delivery_status.set(channel, ChannelStatus::Failed);
                    errors.insert(channel, error);
                }
            }
        }

        let delivered_at = delivery_status
            .all_succeeded(&notification.channels)
            .then(Utc::now);

        DeliveryReport {
            delivery_status,
            errors,
            delivered_at,
        }
    }

    async fn send_one(&self, channel: Channel, message: &OutboundMessage) -> Result<(), String> {
        let sender = self
            .senders
            .get(channel)
            .ok_or_else(|| format!("no sender configured for channel {channel}"))?;
        match tokio::time::timeout(self.send_timeout, sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("{channel} sender timed out after {:?}", self.send_timeout)),
        }
    }
}
