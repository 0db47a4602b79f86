//! Notification entity models and DTOs.

use std::collections::BTreeSet;

use courier_core::channels::{Channel, DeliveryStatus};
use courier_core::priority::Priority;
use courier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `notifications` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: DbId,
    pub user_id: DbId,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub category: String,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    #[sqlx(json)]
    pub channels: BTreeSet<Channel>,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    #[sqlx(json)]
    pub delivery_status: DeliveryStatus,
    pub scheduled_for: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    /// Retry passes consumed by the queue processor.
    pub retry_count: i16,
    /// Claim lease held by a processor invocation.
    #[serde(skip)]
    pub claimed_until: Option<Timestamp>,
    pub dead_lettered_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for creating a notification (business-event producers).
#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub user_id: DbId,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub category: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub channels: BTreeSet<Channel>,
    #[serde(default)]
    pub priority: Priority,
    /// Deliver no earlier than this instant; `None` means now.
    #[serde(default)]
    pub scheduled_for: Option<Timestamp>,
}

/// Result of one dispatch, written back by the queue processor.
///
/// Writing an update always clears `scheduled_for` and releases the claim
/// lease.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    pub delivery_status: DeliveryStatus,
    pub delivered_at: Option<Timestamp>,
    /// Whether this dispatch consumed one retry pass.
    pub consumed_retry: bool,
    pub dead_lettered_at: Option<Timestamp>,
}
