//! Courier delivery engine.
//!
//! - [`EventBus`] is the in-process publish/subscribe hub for business events.
//! - [`NotificationService`] creates, lists and updates notifications.
//! - [`QueueProcessor`] dispatches scheduled notifications and retries
//!   failed channels, dead-lettering the ones that never succeed.
//! - [`DeliveryDispatcher`] fans one notification out to its
//!   [`delivery`] channels.
//! - [`DigestAggregator`] sends per-user digest emails.
//! - [`WebhookDispatcher`] delivers signed events to webhook subscriptions,
//!   and [`WebhookFanout`] feeds it from the bus.
//! - [`NotificationFeed`] and [`RealtimeNotifier`] carry in-app
//!   notifications to live sessions.
//! - [`store`] is the persistence seam (PostgreSQL or in-memory).
//! - [`Engine`] wires all of the above over one set of stores.

pub mod bus;
pub mod delivery;
pub mod digest;
pub mod dispatcher;
pub mod engine;
pub mod fanout;
pub mod feed;
pub mod processor;
pub mod realtime;
pub mod service;
pub mod store;
pub mod webhook;

pub use bus::{EventBus, PlatformEvent};
pub use digest::{DigestAggregator, DigestReport};
pub use dispatcher::{DeliveryDispatcher, DeliveryReport};
pub use engine::{Engine, EngineConfig, EngineError};
pub use fanout::WebhookFanout;
pub use feed::{FeedSubscription, NotificationFeed};
pub use processor::{ProcessReport, ProcessorConfig, QueueProcessor};
pub use realtime::{AlertSink, RealtimeError, RealtimeNotifier};
pub use service::{NotificationService, ServiceError};
pub use store::{StoreError, Stores};
pub use webhook::{DispatchReport, WebhookDispatchConfig, WebhookDispatcher, WebhookResult};
