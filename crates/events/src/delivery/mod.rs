//! Channel senders: the transports behind in-app, push and email delivery.
//!
//! The dispatcher only sees the [`ChannelSender`] trait; each sender turns
//! an [`OutboundMessage`] into whatever its transport needs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::channels::Channel;
use courier_core::priority::Priority;
use courier_core::types::DbId;
use courier_db::models::notification::Notification;

use crate::feed::NotificationFeed;
use crate::store::{RecipientStore, StoreError};

pub mod email;
pub mod in_app;
pub mod push;

pub use email::{EmailConfig, EmailSender};
pub use in_app::InAppSender;
pub use push::{PushConfig, PushGatewaySender};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// What a sender delivers to one user.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub user_id: DbId,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub html: Option<String>,
    pub priority: Priority,
    pub metadata: serde_json::Value,
    /// Stored notification this message was built from; `None` for digests.
    pub notification: Option<Notification>,
}

impl OutboundMessage {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            user_id: notification.user_id,
            subject: notification.title.clone(),
            body: notification.message.clone(),
            html: None,
            priority: notification.priority,
            metadata: notification.metadata.clone(),
            notification: Some(notification.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// No address on file for this user and channel.
    #[error("No {channel} address for user {user_id}")]
    MissingAddress { channel: Channel, user_id: DbId },

    /// The message cannot be carried by this channel.
    #[error("Unsupported message: {0}")]
    Unsupported(String),

    /// The message could not be assembled (bad address, MIME build failure).
    #[error("Message build error: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote gateway answered with a non-2xx status.
    #[error("Gateway returned HTTP {0}")]
    Rejected(u16),

    #[error("Recipient lookup failed: {0}")]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// ChannelSender
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError>;
}

/// Registered senders, at most one per channel.
#[derive(Clone, Default)]
pub struct ChannelSenders {
    senders: BTreeMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelSenders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` under its own channel, replacing any previous one.
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.register(sender);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.senders.keys().copied()
    }

    /// In-app delivery always; email and push when their configuration is
    /// present in the environment.
    pub fn from_env(
        feed: NotificationFeed,
        recipients: Arc<dyn RecipientStore>,
    ) -> Result<Self, SendError> {
        let mut senders = Self::new().with(Arc::new(InAppSender::new(feed)));

        match EmailConfig::from_env() {
            Some(config) => {
                senders.register(Arc::new(EmailSender::new(config, recipients.clone())?));
            }
            None => tracing::warn!("SMTP_HOST not set; email channel disabled"),
        }
        match PushConfig::from_env() {
            Some(config) => {
                senders.register(Arc::new(PushGatewaySender::new(config, recipients)?));
            }
            None => tracing::warn!("PUSH_GATEWAY_URL not set; push channel disabled"),
        }

        tracing::info!(channels = ?senders.channels().collect::<Vec<_>>(), "Channel senders configured");
        Ok(senders)
    }
}

impl fmt::Debug for ChannelSenders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.senders.keys()).finish()
    }
}
