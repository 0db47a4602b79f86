//! Storage seam between the delivery engine and PostgreSQL.
//!
//! The engine talks to traits rather than to the repositories directly so
//! the same processors run against [`PgStore`] in production and
//! [`MemoryStore`] in tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::channels::Channel;
use courier_core::types::{DbId, Timestamp};
use courier_db::models::notification::{DeliveryUpdate, NewNotification, Notification};
use courier_db::models::preference::{NotificationPreference, PreferenceChanges};
use courier_db::models::recipient::Recipient;
use courier_db::models::webhook::{
    CreateWebhook, NewWebhookLog, UpdateWebhook, WebhookConfig, WebhookLog,
};
use courier_db::DbPool;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Error returned by every store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> StoreResult<()>;

    async fn insert(
        &self,
        input: &NewNotification,
        channels: &BTreeSet<Channel>,
        scheduled_for: Timestamp,
    ) -> StoreResult<Notification>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Notification>>;

    /// Claim due notifications (`scheduled_for <= now`).
    async fn claim_due(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<Notification>>;

    /// Claim notifications with failed channels that are eligible for retry.
    async fn claim_failed(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        created_before: Timestamp,
        max_retries: i16,
        limit: i64,
    ) -> StoreResult<Vec<Notification>>;

    async fn claim_by_id(
        &self,
        id: DbId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> StoreResult<Option<Notification>>;

    /// Write a dispatch outcome and release the claim.
    async fn record_delivery(&self, id: DbId, update: &DeliveryUpdate) -> StoreResult<()>;

    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>>;

    async fn list_unread_since(
        &self,
        user_id: DbId,
        since: Timestamp,
    ) -> StoreResult<Vec<Notification>>;

    async fn mark_read(&self, id: DbId, user_id: DbId) -> StoreResult<bool>;

    async fn mark_all_read(&self, user_id: DbId) -> StoreResult<u64>;

    async fn delete(&self, id: DbId, user_id: DbId) -> StoreResult<bool>;

    async fn unread_count(&self, user_id: DbId) -> StoreResult<i64>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn create(&self, input: &CreateWebhook) -> StoreResult<WebhookConfig>;

    async fn list(&self) -> StoreResult<Vec<WebhookConfig>>;

    /// Active subscriptions for `event_type`, in registration order.
    async fn list_active_for_event(&self, event_type: &str) -> StoreResult<Vec<WebhookConfig>>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<WebhookConfig>>;

    async fn update(&self, id: DbId, input: &UpdateWebhook) -> StoreResult<Option<WebhookConfig>>;

    async fn delete(&self, id: DbId) -> StoreResult<bool>;

    async fn record_success(&self, id: DbId, at: Timestamp) -> StoreResult<()>;

    async fn record_failure(&self, id: DbId) -> StoreResult<()>;
}

/// Append-only audit log of webhook attempts.
#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    async fn append(&self, entry: &NewWebhookLog) -> StoreResult<WebhookLog>;

    async fn list_for_webhook(
        &self,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<WebhookLog>>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: DbId) -> StoreResult<Option<NotificationPreference>>;

    async fn upsert(
        &self,
        user_id: DbId,
        changes: &PreferenceChanges,
    ) -> StoreResult<NotificationPreference>;

    async fn list_digest_enabled(&self) -> StoreResult<Vec<NotificationPreference>>;

    /// Claim the digest slot starting at `slot_start`; `false` if taken.
    async fn claim_digest(
        &self,
        user_id: DbId,
        slot_start: Timestamp,
        now: Timestamp,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait RecipientStore: Send + Sync {
    async fn find(&self, user_id: DbId) -> StoreResult<Option<Recipient>>;

    async fn upsert(
        &self,
        user_id: DbId,
        email: Option<&str>,
        push_token: Option<&str>,
    ) -> StoreResult<Recipient>;
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Every store the engine needs, as shared trait objects.
#[derive(Clone)]
pub struct Stores {
    pub notifications: Arc<dyn NotificationStore>,
    pub webhooks: Arc<dyn WebhookStore>,
    pub webhook_logs: Arc<dyn WebhookLogStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub recipients: Arc<dyn RecipientStore>,
}

impl Stores {
    /// All stores backed by one PostgreSQL pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self::from_shared(Arc::new(PgStore::new(pool)))
    }

    /// All stores backed by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self::from_shared(store)
    }

    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: NotificationStore
            + WebhookStore
            + WebhookLogStore
            + PreferenceStore
            + RecipientStore
            + 'static,
    {
        Self {
            notifications: store.clone(),
            webhooks: store.clone(),
            webhook_logs: store.clone(),
            preferences: store.clone(),
            recipients: store,
        }
    }
}
