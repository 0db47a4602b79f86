//! Wiring of the delivery engine, shared by the API server and the worker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::delivery::{ChannelSenders, SendError};
use crate::digest::{DigestAggregator, TemplateError, DEFAULT_DIGEST_INTERVAL};
use crate::dispatcher::DeliveryDispatcher;
use crate::feed::NotificationFeed;
use crate::processor::{env_secs, ProcessorConfig, QueueProcessor};
use crate::service::NotificationService;
use crate::store::Stores;
use crate::webhook::{
    DeliveryError, HttpTransport, WebhookDispatchConfig, WebhookDispatcher, WebhookTransport,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub processor: ProcessorConfig,
    pub webhooks: WebhookDispatchConfig,
    pub digest_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            webhooks: WebhookDispatchConfig::default(),
            digest_interval: DEFAULT_DIGEST_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Component configs from their own variables, plus:
    ///
    /// | Variable               | Default |
    /// |------------------------|---------|
    /// | `DIGEST_INTERVAL_SECS` | `60`    |
    pub fn from_env() -> Self {
        Self {
            processor: ProcessorConfig::from_env(),
            webhooks: WebhookDispatchConfig::from_env(),
            digest_interval: env_secs("DIGEST_INTERVAL_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_DIGEST_INTERVAL),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Channel sender setup failed: {0}")]
    Sender(#[from] SendError),

    #[error("Digest template setup failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Webhook transport setup failed: {0}")]
    Webhook(#[from] DeliveryError),
}

/// Every engine component over one set of stores. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    pub stores: Stores,
    pub feed: NotificationFeed,
    pub bus: Arc<EventBus>,
    pub processor: Arc<QueueProcessor>,
    pub digests: Arc<DigestAggregator>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub notifications: Arc<NotificationService>,
}

impl Engine {
    pub fn new(
        stores: Stores,
        feed: NotificationFeed,
        senders: ChannelSenders,
        transport: Arc<dyn WebhookTransport>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, EngineError> {
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            senders.clone(),
            config.processor.send_timeout,
        ));
        let processor = Arc::new(QueueProcessor::new(
            stores.notifications.clone(),
            dispatcher,
            config.processor,
        ));
        let digests = Arc::new(DigestAggregator::new(
            stores.preferences.clone(),
            stores.notifications.clone(),
            senders,
            config.digest_interval,
        )?);
        let webhooks = Arc::new(
            WebhookDispatcher::new(
                stores.webhooks.clone(),
                stores.webhook_logs.clone(),
                transport,
                config.webhooks,
            )
            .with_shutdown(shutdown),
        );
        let bus = Arc::new(EventBus::default());
        let notifications = Arc::new(NotificationService::new(
            stores.notifications.clone(),
            stores.preferences.clone(),
            processor.clone(),
            bus.clone(),
        ));

        Ok(Self {
            stores,
            feed,
            bus,
            processor,
            digests,
            webhooks,
            notifications,
        })
    }

    /// Senders, HTTP transport and tuning all taken from the environment.
    pub fn from_env(stores: Stores, shutdown: CancellationToken) -> Result<Self, EngineError> {
        let feed = NotificationFeed::default();
        let senders = ChannelSenders::from_env(feed.clone(), stores.recipients.clone())?;
        let transport = Arc::new(HttpTransport::new()?);
        Self::new(stores, feed, senders, transport, EngineConfig::from_env(), shutdown)
    }
}

#[cfg(test)]
mod tests {
    use courier_core::channels::Channel;

    use super::*;
    use crate::delivery::InAppSender;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn created_notification_reaches_the_feed() {
        let store = Arc::new(MemoryStore::new());
        let feed = NotificationFeed::default();
        let senders = ChannelSenders::new().with(Arc::new(InAppSender::new(feed.clone())));
        let engine = Engine::new(
            Stores::memory(store),
            feed,
            senders,
            Arc::new(HttpTransport::new().unwrap()),
            EngineConfig::default(),
            CancellationToken::new(),
        )
        .unwrap();
        let mut subscription = engine.feed.subscribe(4);

        let created = engine
            .notifications
            .create(courier_db::models::notification::NewNotification {
                user_id: 4,
                notification_type: "quote_sent".into(),
                category: "quotes".into(),
                title: "Quote sent".into(),
                message: "Quote #3 is on its way".into(),
                metadata: None,
                channels: [Channel::InApp].into(),
                priority: Default::default(),
                scheduled_for: None,
            })
            .await
            .unwrap();

        let received = subscription.recv().await.unwrap();
        assert_eq!(received.id, created.id);
        assert!(created.delivered_at.is_some());
    }
}
