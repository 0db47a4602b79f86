//! Notification service: the operations behind the notification and
//! preference endpoints.
//!
//! Creating a notification applies the recipient's channel opt-outs,
//! persists the row, dispatches it immediately when it is already due and
//! announces it on the [`EventBus`] as `notification.created`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use courier_core::channels::Channel;
use courier_core::error::CoreError;
use courier_core::event_types::NOTIFICATION_CREATED;
use courier_core::types::{DbId, Timestamp};
use courier_db::models::notification::{NewNotification, Notification};
use courier_db::models::preference::{NotificationPreference, UpdatePreference};

use crate::bus::{EventBus, PlatformEvent};
use crate::processor::QueueProcessor;
use crate::store::{NotificationStore, PreferenceStore, StoreError};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Clamp a client-supplied page size to `1..=MAX_PAGE_SIZE`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

pub struct NotificationService {
    notifications: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceStore>,
    processor: Arc<QueueProcessor>,
    bus: Arc<EventBus>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        preferences: Arc<dyn PreferenceStore>,
        processor: Arc<QueueProcessor>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            notifications,
            preferences,
            processor,
            bus,
        }
    }

    /// Create a notification and, if it is due, dispatch it right away.
    ///
    /// The returned row reflects the outcome of the immediate dispatch. A
    /// dispatch that fails or is claimed elsewhere leaves the row to the
    /// queue processor.
    pub async fn create(&self, input: NewNotification) -> ServiceResult<Notification> {
        validate_new(&input)?;

        let channels = self.effective_channels(&input).await?;
        if channels.is_empty() {
            return Err(CoreError::Validation(
                "Recipient has opted out of every requested channel".into(),
            )
            .into());
        }

        let now = Utc::now();
        let scheduled_for = input.scheduled_for.unwrap_or(now);
        let inserted = self
            .notifications
            .insert(&input, &channels, scheduled_for)
            .await?;

        let notification = if scheduled_for <= now {
            self.dispatch_immediately(inserted, now).await
        } else {
            inserted
        };

        let payload = serde_json::to_value(&notification).unwrap_or_default();
        self.bus.publish(
            PlatformEvent::new(NOTIFICATION_CREATED)
                .with_payload(payload)
                .with_notification(notification.id),
        );

        tracing::info!(
            notification_id = notification.id,
            user_id = notification.user_id,
            notification_type = %notification.notification_type,
            channels = ?notification.channels,
            "Notification created"
        );
        Ok(notification)
    }

    async fn effective_channels(&self, input: &NewNotification) -> ServiceResult<BTreeSet<Channel>> {
        let opt_outs = self
            .preferences
            .get(input.user_id)
            .await?
            .map(|p| p.channel_opt_outs)
            .unwrap_or_default();
        Ok(input.channels.difference(&opt_outs).copied().collect())
    }

    async fn dispatch_immediately(&self, inserted: Notification, now: Timestamp) -> Notification {
        match self.processor.dispatch_now(inserted.id, now).await {
            Ok(Some(_)) => {}
            Ok(None) => return inserted,
            Err(e) => {
                tracing::warn!(
                    notification_id = inserted.id,
                    error = %e,
                    "Immediate dispatch failed; leaving notification to the queue"
                );
                return inserted;
            }
        }
        match self.notifications.find_by_id(inserted.id).await {
            Ok(Some(updated)) => updated,
            _ => inserted,
        }
    }

    pub async fn list(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Notification>> {
        let limit = clamp_limit(limit);
        let offset = offset.unwrap_or(0).max(0);
        Ok(self
            .notifications
            .list_for_user(user_id, unread_only, limit, offset)
            .await?)
    }

    pub async fn unread_count(&self, user_id: DbId) -> ServiceResult<i64> {
        Ok(self.notifications.unread_count(user_id).await?)
    }

    /// Mark one of the user's notifications read. Idempotent.
    pub async fn mark_read(&self, id: DbId, user_id: DbId) -> ServiceResult<()> {
        if !self.notifications.mark_read(id, user_id).await? {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: DbId) -> ServiceResult<u64> {
        Ok(self.notifications.mark_all_read(user_id).await?)
    }

    pub async fn delete(&self, id: DbId, user_id: DbId) -> ServiceResult<()> {
        if !self.notifications.delete(id, user_id).await? {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Stored preferences, or the defaults when the user has none.
    pub async fn preferences(&self, user_id: DbId) -> ServiceResult<NotificationPreference> {
        Ok(self
            .preferences
            .get(user_id)
            .await?
            .unwrap_or_else(|| NotificationPreference::defaults_for(user_id, Utc::now())))
    }

    pub async fn update_preferences(
        &self,
        user_id: DbId,
        input: UpdatePreference,
    ) -> ServiceResult<NotificationPreference> {
        let changes = input.into_changes()?;
        let pref = self.preferences.upsert(user_id, &changes).await?;
        tracing::info!(user_id, digest_enabled = pref.digest_enabled, "Notification preferences updated");
        Ok(pref)
    }
}

fn validate_new(input: &NewNotification) -> Result<(), CoreError> {
    let required = [
        ("type", &input.notification_type),
        ("category", &input.category),
        ("title", &input.title),
        ("message", &input.message),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    if input.channels.is_empty() {
        return Err(CoreError::Validation(
            "At least one channel is required".into(),
        ));
    }
    Ok(())
}

fn not_found(id: DbId) -> ServiceError {
    CoreError::NotFound {
        entity: "Notification",
        id,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;
    use courier_core::channels::ChannelStatus;
    use courier_core::priority::Priority;
    use courier_db::models::preference::PreferenceChanges;

    use super::*;
    use crate::delivery::ChannelSenders;
    use crate::dispatcher::test_support::RecordingSender;
    use crate::dispatcher::{DeliveryDispatcher, DEFAULT_SEND_TIMEOUT};
    use crate::processor::ProcessorConfig;
    use crate::store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        email: Arc<RecordingSender>,
        bus: Arc<EventBus>,
        service: NotificationService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let in_app = Arc::new(RecordingSender::new(Channel::InApp, false));
        let email = Arc::new(RecordingSender::new(Channel::Email, false));
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            ChannelSenders::new().with(in_app).with(email.clone()),
            DEFAULT_SEND_TIMEOUT,
        ));
        let processor = Arc::new(QueueProcessor::new(
            store.clone(),
            dispatcher,
            ProcessorConfig::default(),
        ));
        let bus = Arc::new(EventBus::default());
        let service = NotificationService::new(store.clone(), store.clone(), processor, bus.clone());
        Harness {
            store,
            email,
            bus,
            service,
        }
    }

    fn new_notification(channels: &[Channel]) -> NewNotification {
        NewNotification {
            user_id: 7,
            notification_type: "invoice_paid".into(),
            category: "billing".into(),
            title: "Invoice paid".into(),
            message: "Invoice #88 was paid".into(),
            metadata: None,
            channels: channels.iter().copied().collect(),
            priority: Priority::High,
            scheduled_for: None,
        }
    }

    #[tokio::test]
    async fn create_dispatches_immediately_and_announces() {
        let h = harness();
        let mut events = h.bus.subscribe();

        let created = h
            .service
            .create(new_notification(&[Channel::InApp, Channel::Email]))
            .await
            .unwrap();

        assert_eq!(created.delivery_status.get(Channel::InApp), ChannelStatus::Success);
        assert_eq!(created.delivery_status.get(Channel::Email), ChannelStatus::Success);
        assert!(created.delivered_at.is_some());
        assert_eq!(h.email.calls(), 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, NOTIFICATION_CREATED);
        assert_eq!(event.notification_id, Some(created.id));
        assert_eq!(event.payload["title"], "Invoice paid");
    }

    #[tokio::test]
    async fn scheduled_notification_waits_for_the_queue() {
        let h = harness();
        let mut input = new_notification(&[Channel::Email]);
        input.scheduled_for = Some(Utc::now() + ChronoDuration::hours(1));

        let created = h.service.create(input).await.unwrap();

        assert_eq!(created.delivery_status.get(Channel::Email), ChannelStatus::Pending);
        assert!(created.scheduled_for.is_some());
        assert_eq!(h.email.calls(), 0);
    }

    #[tokio::test]
    async fn opted_out_channels_are_dropped() {
        let h = harness();
        let changes = PreferenceChanges {
            channel_opt_outs: Some(BTreeSet::from([Channel::Email])),
            ..Default::default()
        };
        PreferenceStore::upsert(&*h.store, 7, &changes).await.unwrap();

        let created = h
            .service
            .create(new_notification(&[Channel::InApp, Channel::Email]))
            .await
            .unwrap();
        assert_eq!(created.channels, BTreeSet::from([Channel::InApp]));
        assert_eq!(h.email.calls(), 0);

        let all_out = h.service.create(new_notification(&[Channel::Email])).await;
        assert_matches!(all_out, Err(ServiceError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn create_rejects_blank_fields_and_empty_channels() {
        let h = harness();
        let mut blank = new_notification(&[Channel::InApp]);
        blank.title = "  ".into();
        assert_matches!(
            h.service.create(blank).await,
            Err(ServiceError::Core(CoreError::Validation(msg))) if msg.contains("title")
        );
        assert_matches!(
            h.service.create(new_notification(&[])).await,
            Err(ServiceError::Core(CoreError::Validation(_)))
        );
    }

    #[tokio::test]
    async fn read_and_delete_are_owner_scoped() {
        let h = harness();
        let created = h.service.create(new_notification(&[Channel::InApp])).await.unwrap();

        assert_matches!(
            h.service.mark_read(created.id, 8).await,
            Err(ServiceError::Core(CoreError::NotFound { .. }))
        );
        h.service.mark_read(created.id, 7).await.unwrap();
        h.service.mark_read(created.id, 7).await.unwrap();
        assert_eq!(h.service.unread_count(7).await.unwrap(), 0);

        assert_matches!(
            h.service.delete(created.id, 8).await,
            Err(ServiceError::Core(CoreError::NotFound { .. }))
        );
        h.service.delete(created.id, 7).await.unwrap();
        assert!(h.service.list(7, false, None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn preferences_default_then_update() {
        let h = harness();
        let defaults = h.service.preferences(3).await.unwrap();
        assert!(!defaults.digest_enabled);

        let updated = h
            .service
            .update_preferences(
                3,
                UpdatePreference {
                    digest_enabled: Some(true),
                    digest_time: Some("18:30".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.digest_enabled);
        assert_eq!(updated.digest_time.to_string(), "18:30:00");

        let invalid = h
            .service
            .update_preferences(
                3,
                UpdatePreference {
                    digest_time: Some("25:00".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(invalid, Err(ServiceError::Core(CoreError::Validation(_))));
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(clamp_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(1_000)), MAX_PAGE_SIZE);
    }
}
