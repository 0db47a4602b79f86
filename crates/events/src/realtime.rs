//! Client-side realtime inbox.
//!
//! [`RealtimeNotifier`] is the single-owner state machine a signed-in
//! session drives: it loads the inbox, follows the feed for new
//! notifications, and applies read/delete actions optimistically before
//! mirroring them to the store. Local state is the source of truth for the
//! session; [`RealtimeNotifier::refresh`] reconciles it with the store.

use std::sync::Arc;

use chrono::Utc;
use courier_core::types::DbId;
use courier_db::models::notification::Notification;

use crate::feed::{FeedSubscription, NotificationFeed};
use crate::store::{NotificationStore, StoreError};

/// Number of notifications loaded when a session starts.
pub const DEFAULT_INBOX_LIMIT: i64 = 50;

/// Receives an ephemeral alert ("toast") for each new notification.
pub trait AlertSink: Send + Sync {
    fn alert(&self, notification: &Notification);
}

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("No user is signed in")]
    NotStarted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Session {
    user_id: DbId,
    subscription: FeedSubscription,
    /// Newest first.
    items: Vec<Notification>,
}

pub struct RealtimeNotifier {
    store: Arc<dyn NotificationStore>,
    feed: NotificationFeed,
    alerts: Arc<dyn AlertSink>,
    inbox_limit: i64,
    session: Option<Session>,
}

impl RealtimeNotifier {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        feed: NotificationFeed,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            store,
            feed,
            alerts,
            inbox_limit: DEFAULT_INBOX_LIMIT,
            session: None,
        }
    }

    pub async fn start(&mut self, user_id: DbId) -> Result<(), RealtimeError> {
        self.switch_user(Some(user_id)).await
    }

    /// Follow the signed-in identity. Re-subscribes only when it changes;
    /// `None` behaves like [`stop`](Self::stop).
    pub async fn switch_user(&mut self, user_id: Option<DbId>) -> Result<(), RealtimeError> {
        let Some(user_id) = user_id else {
            self.stop();
            return Ok(());
        };
        if self.user_id() == Some(user_id) {
            return Ok(());
        }

        // Subscribe before loading so nothing inserted in between is missed;
        // overlap is removed by the id dedupe in `next_event`.
        self.session = None;
        let subscription = self.feed.subscribe(user_id);
        let items = self
            .store
            .list_for_user(user_id, false, self.inbox_limit, 0)
            .await?;
        self.session = Some(Session {
            user_id,
            subscription,
            items,
        });
        tracing::debug!(user_id, "Realtime session started");
        Ok(())
    }

    /// Drop the subscription and all local state (logout).
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(user_id = session.user_id, "Realtime session stopped");
        }
    }

    pub fn user_id(&self) -> Option<DbId> {
        self.session.as_ref().map(|s| s.user_id)
    }

    /// Local inbox, newest first.
    pub fn notifications(&self) -> &[Notification] {
        self.session.as_ref().map_or(&[], |s| s.items.as_slice())
    }

    pub fn unread_count(&self) -> usize {
        self.notifications().iter().filter(|n| !n.is_read).count()
    }

    /// Reload the inbox from the store.
    pub async fn refresh(&mut self) -> Result<(), RealtimeError> {
        let session = self.session.as_mut().ok_or(RealtimeError::NotStarted)?;
        session.items = self
            .store
            .list_for_user(session.user_id, false, self.inbox_limit, 0)
            .await?;
        Ok(())
    }

    /// Wait for the next notification, prepend it and raise an alert.
    ///
    /// Returns `None` when no session is active or the feed has closed.
    pub async fn next_event(&mut self) -> Option<&Notification> {
        let session = self.session.as_mut()?;
        let notification = session.subscription.recv().await?;

        let known = session.items.iter().position(|n| n.id == notification.id);
        if let Some(index) = known {
            session.items.remove(index);
        } else {
            self.alerts.alert(&notification);
        }
        session.items.insert(0, notification);
        session.items.first()
    }

    /// Mark one notification read locally, then in the store.
    ///
    /// A store error is returned after the local change has been applied.
    pub async fn mark_read(&mut self, id: DbId) -> Result<bool, RealtimeError> {
        let session = self.session.as_mut().ok_or(RealtimeError::NotStarted)?;
        if let Some(n) = session.items.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
            n.read_at.get_or_insert_with(Utc::now);
        }
        Ok(self.store.mark_read(id, session.user_id).await?)
    }

    pub async fn mark_all_read(&mut self) -> Result<u64, RealtimeError> {
        let session = self.session.as_mut().ok_or(RealtimeError::NotStarted)?;
        let now = Utc::now();
        for n in session.items.iter_mut().filter(|n| !n.is_read) {
            n.is_read = true;
            n.read_at = Some(now);
        }
        Ok(self.store.mark_all_read(session.user_id).await?)
    }

    pub async fn delete(&mut self, id: DbId) -> Result<bool, RealtimeError> {
        let session = self.session.as_mut().ok_or(RealtimeError::NotStarted)?;
        session.items.retain(|n| n.id != id);
        Ok(self.store.delete(id, session.user_id).await?)
    }
}
