//! Server-side realtime feed of delivered in-app notifications.
//!
//! One broadcast channel carries every user's notifications; each
//! [`FeedSubscription`] filters on user-id equality.

use std::sync::Arc;

use courier_core::types::DbId;
use courier_db::models::notification::Notification;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct NotificationFeed {
    sender: Arc<broadcast::Sender<Notification>>,
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish to every live subscription. Returns the number of receivers.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Number of live subscriptions across all users.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self, user_id: DbId) -> FeedSubscription {
        FeedSubscription {
            user_id,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct FeedSubscription {
    user_id: DbId,
    receiver: broadcast::Receiver<Notification>,
}

impl FeedSubscription {
    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    /// Next notification for this subscription's user.
    ///
    /// Returns `None` once the feed is closed. Lagging drops the missed
    /// items with a warning; the next inbox refresh picks them up.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(n) if n.user_id == self.user_id => return Some(n),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = self.user_id, skipped, "Realtime feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
