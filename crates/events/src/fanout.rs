//! Bridges the [`EventBus`](crate::bus::EventBus) to the webhook dispatcher.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::bus::PlatformEvent;
use crate::webhook::WebhookDispatcher;

/// Forwards every bus event to its webhook subscriptions, one event at a
/// time, until cancelled or the bus closes.
pub struct WebhookFanout {
    dispatcher: Arc<WebhookDispatcher>,
}

impl WebhookFanout {
    pub fn new(dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn run(&self, mut receiver: broadcast::Receiver<PlatformEvent>, cancel: CancellationToken) {
        tracing::info!("Webhook fan-out started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Webhook fan-out cancelled");
                    break;
                }
                received = receiver.recv() => received,
            };

            match event {
                Ok(event) => self.forward(&event, &cancel).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Webhook fan-out lagged; events were dropped");
                }
                Err(RecvError::Closed) => {
                    tracing::info!("Event bus closed; webhook fan-out stopping");
                    break;
                }
            }
        }
    }

    async fn forward(&self, event: &PlatformEvent, cancel: &CancellationToken) {
        let result = self
            .dispatcher
            .dispatch_with_cancel(&event.event_type, &event.payload, event.notification_id, cancel)
            .await;
        if let Err(e) = result {
            tracing::error!(event_type = %event.event_type, error = %e, "Webhook dispatch failed");
        }
    }
}
