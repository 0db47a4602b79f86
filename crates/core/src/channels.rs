//! Delivery channels and per-channel delivery status.
//!
//! The string forms returned by [`Channel::as_str`] and
//! [`ChannelStatus::as_str`] are the values persisted in the
//! `notifications.channels` and `notifications.delivery_status` JSONB
//! columns.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A delivery medium for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Stored inbox entry pushed to live sessions over the realtime feed.
    InApp,
    /// Mobile/web push via the push gateway.
    Push,
    /// Email via SMTP.
    Email,
}

impl Channel {
    /// Every channel, in persistence order.
    pub const ALL: [Channel; 3] = [Channel::InApp, Channel::Push, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Push => "push",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_app" => Ok(Channel::InApp),
            "push" => Ok(Channel::Push),
            "email" => Ok(Channel::Email),
            other => Err(CoreError::Validation(format!("Unknown channel '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelStatus
// ---------------------------------------------------------------------------

/// Outcome of delivery on a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Pending,
    Success,
    Failed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Pending => "pending",
            ChannelStatus::Success => "success",
            ChannelStatus::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

/// Per-channel delivery state of one notification.
///
/// Serialized as a flat JSON object, e.g. `{"email":"failed","in_app":"success"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryStatus(BTreeMap<Channel, ChannelStatus>);

impl DeliveryStatus {
    /// A status map with every given channel set to [`ChannelStatus::Pending`].
    pub fn pending_for<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> Self {
        Self(
            channels
                .into_iter()
                .map(|c| (*c, ChannelStatus::Pending))
                .collect(),
        )
    }

    /// Status of `channel`; channels never recorded count as pending.
    pub fn get(&self, channel: Channel) -> ChannelStatus {
        self.0
            .get(&channel)
            .copied()
            .unwrap_or(ChannelStatus::Pending)
    }

    pub fn set(&mut self, channel: Channel, status: ChannelStatus) {
        self.0.insert(channel, status);
    }

    /// Channels currently marked [`ChannelStatus::Failed`].
    pub fn failed_channels(&self) -> BTreeSet<Channel> {
        self.0
            .iter()
            .filter(|(_, s)| **s == ChannelStatus::Failed)
            .map(|(c, _)| *c)
            .collect()
    }

    /// `true` when every channel in `requested` is [`ChannelStatus::Success`].
    ///
    /// An empty request set is never considered delivered.
    pub fn all_succeeded(&self, requested: &BTreeSet<Channel>) -> bool {
        !requested.is_empty()
            && requested
                .iter()
                .all(|c| self.get(*c) == ChannelStatus::Success)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, ChannelStatus)> + '_ {
        self.0.iter().map(|(c, s)| (*c, *s))
    }
}

impl FromIterator<(Channel, ChannelStatus)> for DeliveryStatus {
    fn from_iter<I: IntoIterator<Item = (Channel, ChannelStatus)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trips_through_str() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn unknown_channel_is_rejected() {
        assert!("sms".parse::<Channel>().is_err());
    }

    #[test]
    fn status_serializes_as_flat_object() {
        let mut status = DeliveryStatus::pending_for(&[Channel::Email, Channel::InApp]);
        status.set(Channel::InApp, ChannelStatus::Success);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"in_app": "success", "email": "pending"}));

        let back: DeliveryStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn invalid_status_value_fails_to_deserialize() {
        let result: Result<DeliveryStatus, _> =
            serde_json::from_value(serde_json::json!({"email": "sent"}));
        assert!(result.is_err());
    }

    #[test]
    fn all_succeeded_requires_every_requested_channel() {
        let requested: BTreeSet<_> = [Channel::InApp, Channel::Email].into();
        let mut status = DeliveryStatus::pending_for(&requested);
        status.set(Channel::InApp, ChannelStatus::Success);
        assert!(!status.all_succeeded(&requested));

        status.set(Channel::Email, ChannelStatus::Success);
        assert!(status.all_succeeded(&requested));
    }

    #[test]
    fn empty_request_is_never_delivered() {
        assert!(!DeliveryStatus::default().all_succeeded(&BTreeSet::new()));
    }

    #[test]
    fn failed_channels_lists_only_failures() {
        let status: DeliveryStatus = [
            (Channel::InApp, ChannelStatus::Success),
            (Channel::Push, ChannelStatus::Failed),
            (Channel::Email, ChannelStatus::Failed),
        ]
        .into_iter()
        .collect();

        let failed: Vec<_> = status.failed_channels().into_iter().collect();
        assert_eq!(failed, vec![Channel::Push, Channel::Email]);
    }
}
