//! In-memory implementation of every store trait.
//!
//! Mirrors the SQL semantics of the repositories, claim leases included, so
//! the processors and the HTTP layer can be exercised without a database.
//! [`MemoryStore::set_unavailable`] makes every call fail, which lets tests
//! cover store outages.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use courier_core::channels::{Channel, DeliveryStatus};
use courier_core::types::{DbId, Timestamp};
use courier_db::models::notification::{DeliveryUpdate, NewNotification, Notification};
use courier_db::models::preference::{NotificationPreference, PreferenceChanges};
use courier_db::models::recipient::Recipient;
use courier_db::models::webhook::{
    CreateWebhook, NewWebhookLog, UpdateWebhook, WebhookConfig, WebhookLog, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_SECONDS,
};

use super::{
    NotificationStore, PreferenceStore, RecipientStore, StoreError, StoreResult, WebhookLogStore,
    WebhookStore,
};

#[derive(Default)]
struct State {
    notifications: BTreeMap<DbId, Notification>,
    webhooks: BTreeMap<DbId, WebhookConfig>,
    logs: Vec<WebhookLog>,
    preferences: BTreeMap<DbId, NotificationPreference>,
    recipients: BTreeMap<DbId, Recipient>,
    last_id: DbId,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

fn claimable(n: &Notification, now: Timestamp) -> bool {
    n.delivered_at.is_none()
        && n.dead_lettered_at.is_none()
        && n.claimed_until.is_none_or(|until| until < now)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn state_unchecked(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Inspection helpers
    // -----------------------------------------------------------------------

    /// Current copy of a notification, bypassing availability.
    pub fn notification(&self, id: DbId) -> Option<Notification> {
        self.state_unchecked().notifications.get(&id).cloned()
    }

    pub fn webhook(&self, id: DbId) -> Option<WebhookConfig> {
        self.state_unchecked().webhooks.get(&id).cloned()
    }

    /// Log rows for a webhook in append order.
    pub fn logs_for(&self, webhook_id: DbId) -> Vec<WebhookLog> {
        self.state_unchecked()
            .logs
            .iter()
            .filter(|l| l.webhook_id == webhook_id)
            .cloned()
            .collect()
    }

    /// Backdate a notification, e.g. to move it past the retry cooldown.
    pub fn set_created_at(&self, id: DbId, created_at: Timestamp) {
        if let Some(n) = self.state_unchecked().notifications.get_mut(&id) {
            n.created_at = created_at;
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }

    async fn insert(
        &self,
        input: &NewNotification,
        channels: &BTreeSet<Channel>,
        scheduled_for: Timestamp,
    ) -> StoreResult<Notification> {
        let mut state = self.state()?;
        let id = state.next_id();
        let notification = Notification {
            id,
            user_id: input.user_id,
            notification_type: input.notification_type.clone(),
            category: input.category.clone(),
            title: input.title.clone(),
            message: input.message.clone(),
            metadata: input
                .metadata
                .clone()
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            channels: channels.clone(),
            priority: input.priority,
            delivery_status: DeliveryStatus::pending_for(channels),
            scheduled_for: Some(scheduled_for),
            delivered_at: None,
            is_read: false,
            read_at: None,
            retry_count: 0,
            claimed_until: None,
            dead_lettered_at: None,
            created_at: Utc::now(),
        };
        state.notifications.insert(id, notification.clone());
        Ok(notification)
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Notification>> {
        Ok(self.state()?.notifications.get(&id).cloned())
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let mut state = self.state()?;
        let mut due: Vec<&mut Notification> = state
            .notifications
            .values_mut()
            .filter(|n| n.scheduled_for.is_some_and(|at| at <= now) && claimable(n, now))
            .collect();
        due.sort_by_key(|n| n.scheduled_for);
        Ok(due
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|n| {
                n.claimed_until = Some(lease_until);
                n.clone()
            })
            .collect())
    }

    async fn claim_failed(
        &self,
        now: Timestamp,
        lease_until: Timestamp,
        created_before: Timestamp,
        max_retries: i16,
        limit: i64,
    ) -> StoreResult<Vec<Notification>> {
        let mut state = self.state()?;
        let mut failed: Vec<&mut Notification> = state
            .notifications
            .values_mut()
            .filter(|n| {
                n.scheduled_for.is_none()
                    && n.created_at < created_before
                    && n.retry_count < max_retries
                    && !n.delivery_status.failed_channels().is_empty()
                    && claimable(n, now)
            })
            .collect();
        failed.sort_by_key(|n| n.created_at);
        Ok(failed
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|n| {
                n.claimed_until = Some(lease_until);
                n.clone()
            })
            .collect())
    }

    async fn claim_by_id(
        &self,
        id: DbId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> StoreResult<Option<Notification>> {
        let mut state = self.state()?;
        Ok(state
            .notifications
            .get_mut(&id)
            .filter(|n| n.scheduled_for.is_none_or(|at| at <= now) && claimable(n, now))
            .map(|n| {
                n.claimed_until = Some(lease_until);
                n.clone()
            }))
    }

    async fn record_delivery(&self, id: DbId, update: &DeliveryUpdate) -> StoreResult<()> {
        let mut state = self.state()?;
        if let Some(n) = state.notifications.get_mut(&id) {
            n.delivery_status = update.delivery_status.clone();
            n.delivered_at = update.delivered_at;
            if update.consumed_retry {
                n.retry_count += 1;
            }
            n.dead_lettered_at = update.dead_lettered_at;
            n.scheduled_for = None;
            n.claimed_until = None;
        }
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        let state = self.state()?;
        let mut items: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn list_unread_since(
        &self,
        user_id: DbId,
        since: Timestamp,
    ) -> StoreResult<Vec<Notification>> {
        let state = self.state()?;
        let mut items: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read && n.created_at >= since)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn mark_read(&self, id: DbId, user_id: DbId) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id => {
                n.is_read = true;
                n.read_at.get_or_insert_with(Utc::now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: DbId) -> StoreResult<u64> {
        let mut state = self.state()?;
        let now = Utc::now();
        let mut marked = 0;
        for n in state
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(now);
            marked += 1;
        }
        Ok(marked)
    }

    async fn delete(&self, id: DbId, user_id: DbId) -> StoreResult<bool> {
        let mut state = self.state()?;
        let owned = state
            .notifications
            .get(&id)
            .is_some_and(|n| n.user_id == user_id);
        if owned {
            state.notifications.remove(&id);
        }
        Ok(owned)
    }

    async fn unread_count(&self, user_id: DbId) -> StoreResult<i64> {
        let state = self.state()?;
        let count = state
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count();
        Ok(count as i64)
    }
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn create(&self, input: &CreateWebhook) -> StoreResult<WebhookConfig> {
        let mut state = self.state()?;
        let id = state.next_id();
        let now = Utc::now();
        let webhook = WebhookConfig {
            id,
            name: input.name.clone(),
            url: input.url.clone(),
            secret: input.secret.clone(),
            events: input.events.clone(),
            is_active: input.is_active.unwrap_or(true),
            max_retries: input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay_seconds: input
                .retry_delay_seconds
                .unwrap_or(DEFAULT_RETRY_DELAY_SECONDS),
            total_calls: 0,
            failed_calls: 0,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };
        state.webhooks.insert(id, webhook.clone());
        Ok(webhook)
    }

    async fn list(&self) -> StoreResult<Vec<WebhookConfig>> {
        Ok(self.state()?.webhooks.values().cloned().collect())
    }

    async fn list_active_for_event(&self, event_type: &str) -> StoreResult<Vec<WebhookConfig>> {
        Ok(self
            .state()?
            .webhooks
            .values()
            .filter(|w| w.accepts(event_type))
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<WebhookConfig>> {
        Ok(self.state()?.webhooks.get(&id).cloned())
    }

    async fn update(&self, id: DbId, input: &UpdateWebhook) -> StoreResult<Option<WebhookConfig>> {
        let mut state = self.state()?;
        let Some(w) = state.webhooks.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = &input.name {
            w.name = v.clone();
        }
        if let Some(v) = &input.url {
            w.url = v.clone();
        }
        if let Some(secret) = input.secret_change() {
            w.secret = secret.map(str::to_string);
        }
        if let Some(v) = &input.events {
            w.events = v.clone();
        }
        if let Some(v) = input.is_active {
            w.is_active = v;
        }
        if let Some(v) = input.max_retries {
            w.max_retries = v;
        }
        if let Some(v) = input.retry_delay_seconds {
            w.retry_delay_seconds = v;
        }
        w.updated_at = Utc::now();
        Ok(Some(w.clone()))
    }

    async fn delete(&self, id: DbId) -> StoreResult<bool> {
        let mut state = self.state()?;
        let removed = state.webhooks.remove(&id).is_some();
        if removed {
            state.logs.retain(|l| l.webhook_id != id);
        }
        Ok(removed)
    }

    async fn record_success(&self, id: DbId, at: Timestamp) -> StoreResult<()> {
        if let Some(w) = self.state()?.webhooks.get_mut(&id) {
            w.total_calls += 1;
            w.last_triggered_at = Some(at);
        }
        Ok(())
    }

    async fn record_failure(&self, id: DbId) -> StoreResult<()> {
        if let Some(w) = self.state()?.webhooks.get_mut(&id) {
            w.failed_calls += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookLogStore for MemoryStore {
    async fn append(&self, entry: &NewWebhookLog) -> StoreResult<WebhookLog> {
        let mut state = self.state()?;
        let id = state.next_id();
        let log = WebhookLog {
            id,
            webhook_id: entry.webhook_id,
            event_type: entry.event_type.clone(),
            notification_id: entry.notification_id,
            payload: entry.payload.clone(),
            status_code: entry.status_code,
            response_body: entry.response_body.clone(),
            error_message: entry.error_message.clone(),
            success: entry.success,
            attempt_number: entry.attempt_number,
            created_at: Utc::now(),
        };
        state.logs.push(log.clone());
        Ok(log)
    }

    async fn list_for_webhook(
        &self,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<WebhookLog>> {
        let state = self.state()?;
        Ok(state
            .logs
            .iter()
            .rev()
            .filter(|l| l.webhook_id == webhook_id)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preferences and recipients
// ---------------------------------------------------------------------------

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get(&self, user_id: DbId) -> StoreResult<Option<NotificationPreference>> {
        Ok(self.state()?.preferences.get(&user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: DbId,
        changes: &PreferenceChanges,
    ) -> StoreResult<NotificationPreference> {
        let mut state = self.state()?;
        let now = Utc::now();
        let pref = state
            .preferences
            .entry(user_id)
            .or_insert_with(|| NotificationPreference::defaults_for(user_id, now));
        changes.clone().apply(pref);
        pref.updated_at = now;
        Ok(pref.clone())
    }

    async fn list_digest_enabled(&self) -> StoreResult<Vec<NotificationPreference>> {
        Ok(self
            .state()?
            .preferences
            .values()
            .filter(|p| p.digest_enabled)
            .cloned()
            .collect())
    }

    async fn claim_digest(
        &self,
        user_id: DbId,
        slot_start: Timestamp,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.preferences.get_mut(&user_id) {
            Some(p) if p.digest_last_sent_at.is_none_or(|sent| sent < slot_start) => {
                p.digest_last_sent_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RecipientStore for MemoryStore {
    async fn find(&self, user_id: DbId) -> StoreResult<Option<Recipient>> {
        Ok(self.state()?.recipients.get(&user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: DbId,
        email: Option<&str>,
        push_token: Option<&str>,
    ) -> StoreResult<Recipient> {
        let recipient = Recipient {
            user_id,
            email: email.map(str::to_string),
            push_token: push_token.map(str::to_string),
            updated_at: Utc::now(),
        };
        self.state()?.recipients.insert(user_id, recipient.clone());
        Ok(recipient)
    }
}
