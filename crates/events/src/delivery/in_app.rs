//! In-app delivery: hand the stored notification to the realtime feed.

use async_trait::async_trait;
use courier_core::channels::Channel;

use super::{ChannelSender, OutboundMessage, SendError};
use crate::feed::NotificationFeed;

/// The notification row is the inbox entry, so in-app delivery only has to
/// push it to connected sessions. Nobody listening is still a success.
#[derive(Clone)]
pub struct InAppSender {
    feed: NotificationFeed,
}

impl InAppSender {
    pub fn new(feed: NotificationFeed) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let notification = message.notification.as_ref().ok_or_else(|| {
            SendError::Unsupported("in-app delivery needs a stored notification".into())
        })?;
        let listeners = self.feed.publish(notification.clone());
        tracing::debug!(
            notification_id = notification.id,
            user_id = notification.user_id,
            listeners,
            "In-app notification published"
        );
        Ok(())
    }
}
