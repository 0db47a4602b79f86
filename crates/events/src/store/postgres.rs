//! PostgreSQL-backed stores delegating to the `courier-db` repositories.

use std::collections::BTreeSet;

use async_trait::async_trait;
use courier_core::channels::Channel;
use courier_core::types::{DbId, Timestamp};
use courier_db::models::notification::{DeliveryUpdate, NewNotification, Notification};
use courier_db::models::preference::{NotificationPreference, PreferenceChanges};
use courier_db::models::recipient::Recipient;
use courier_db::models::webhook::{
    CreateWebhook, NewWebhookLog, UpdateWebhook, WebhookConfig, WebhookLog,
};
use courier_db::repositories::{
    NotificationPreferenceRepo, NotificationRepo, RecipientRepo, WebhookLogRepo, WebhookRepo,
};
use courier_db::DbPool;

use super::{
    NotificationStore, PreferenceStore, RecipientStore, StoreResult, WebhookLogStore, WebhookStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(courier_db::health_check(&self.pool).await?)
    }

    async fn insert(
        &self,
        input: &NewNotification,
        channels: &BTreeSet<Channel>,
        scheduled_for: Timestamp,
    ) -> StoreResult<Notification> {
        Ok(NotificationRepo::insert(&self.pool, input, channels, scheduled_for).await?)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Notification>> {
        Ok(NotificationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        Ok(NotificationRepo::claim_due(&self.pool, now, lease_until, limit).await?)
    }

    async fn claim_failed(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        created_before: Timestamp,
        max_retries: i16,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        Ok(NotificationRepo::claim_failed(
            &self.pool,
            now,
            lease_until,
            created_before,
            max_retries,
            limit,
        )
        .await?)
    }

    async fn claim_by_id(
        &self,
        id: DbId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> StoreResult<Option<Notification>> {
        Ok(NotificationRepo::claim_by_id(&self.pool, id, now, lease_until).await?)
    }

    async fn record_delivery(&self, id: DbId, update: &DeliveryUpdate) -> StoreResult<()> {
        Ok(NotificationRepo::record_delivery(&self.pool, id, update).await?)
    }

    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        Ok(NotificationRepo::list_for_user(&self.pool, user_id, unread_only, limit, offset).await?)
    }

    async fn list_unread_since(
        &self,
        user_id: DbId,
        since: Timestamp,
    ) -> StoreResult<Vec<Notification>> {
        Ok(NotificationRepo::list_unread_since(&self.pool, user_id, since).await?)
    }

    async fn mark_read(&self, id: DbId, user_id: DbId) -> StoreResult<bool> {
        Ok(NotificationRepo::mark_read(&self.pool, id, user_id).await?)
    }

    async fn mark_all_read(&self, user_id: DbId) -> StoreResult<u64> {
        Ok(NotificationRepo::mark_all_read(&self.pool, user_id).await?)
    }

    async fn delete(&self, id: DbId, user_id: DbId) -> StoreResult<bool> {
        Ok(NotificationRepo::delete(&self.pool, id, user_id).await?)
    }

    async fn unread_count(&self, user_id: DbId) -> StoreResult<i64> {
        Ok(NotificationRepo::unread_count(&self.pool, user_id).await?)
    }
}

#[async_trait]
impl WebhookStore for PgStore {
    async fn create(&self, input: &CreateWebhook) -> StoreResult<WebhookConfig> {
        Ok(WebhookRepo::create(&self.pool, input).await?)
    }

    async fn list(&self) -> StoreResult<Vec<WebhookConfig>> {
        Ok(WebhookRepo::list(&self.pool).await?)
    }

    async fn list_active_for_event(&self, event_type: &str) -> StoreResult<Vec<WebhookConfig>> {
        Ok(WebhookRepo::list_active_for_event(&self.pool, event_type).await?)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<WebhookConfig>> {
        Ok(WebhookRepo::find_by_id(&self.pool, id).await?)
    }

    async fn update(&self, id: DbId, input: &UpdateWebhook) -> StoreResult<Option<WebhookConfig>> {
        Ok(WebhookRepo::update(&self.pool, id, input).await?)
    }

    async fn delete(&self, id: DbId) -> StoreResult<bool> {
        Ok(WebhookRepo::delete(&self.pool, id).await?)
    }

    async fn record_success(&self, id: DbId, at: Timestamp) -> StoreResult<()> {
        Ok(WebhookRepo::record_success(&self.pool, id, at).await?)
    }

    async fn record_failure(&self, id: DbId) -> StoreResult<()> {
        Ok(WebhookRepo::record_failure(&self.pool, id).await?)
    }
}

#[async_trait]
impl WebhookLogStore for PgStore {
    async fn append(&self, entry: &NewWebhookLog) -> StoreResult<WebhookLog> {
        Ok(WebhookLogRepo::append(&self.pool, entry).await?)
    }

    async fn list_for_webhook(
        &self,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<WebhookLog>> {
        Ok(WebhookLogRepo::list_for_webhook(&self.pool, webhook_id, limit, offset).await?)
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn get(&self, user_id: DbId) -> StoreResult<Option<NotificationPreference>> {
        Ok(NotificationPreferenceRepo::get(&self.pool, user_id).await?)
    }

    async fn upsert(
        &self,
        user_id: DbId,
        changes: &PreferenceChanges,
    ) -> StoreResult<NotificationPreference> {
        Ok(NotificationPreferenceRepo::upsert(&self.pool, user_id, changes).await?)
    }

    async fn list_digest_enabled(&self) -> StoreResult<Vec<NotificationPreference>> {
        Ok(NotificationPreferenceRepo::list_digest_enabled(&self.pool).await?)
    }

    async fn claim_digest(
        &self,
        user_id: DbId,
        slot_start: Timestamp,
        now: Timestamp,
    ) -> StoreResult<bool> {
        Ok(NotificationPreferenceRepo::claim_digest(&self.pool, user_id, slot_start, now).await?)
    }
}

#[async_trait]
impl RecipientStore for PgStore {
    async fn find(&self, user_id: DbId) -> StoreResult<Option<Recipient>> {
        Ok(RecipientRepo::find(&self.pool, user_id).await?)
    }

    async fn upsert(
        &self,
        user_id: DbId,
        email: Option<&str>,
        push_token: Option<&str>,
    ) -> StoreResult<Recipient> {
        Ok(RecipientRepo::upsert(&self.pool, user_id, email, push_token).await?)
    }
}
