//! Event type names published on the event bus by this service itself.
//!
//! Business producers publish their own dot-separated names (e.g.
//! `"quote.accepted"`); webhook subscriptions match them verbatim.

/// Published after a notification row has been inserted.
pub const NOTIFICATION_CREATED: &str = "notification.created";

/// Published by the admin API to exercise a webhook endpoint.
pub const WEBHOOK_TEST: &str = "webhook.test";
