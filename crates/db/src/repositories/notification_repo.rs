//! Repository for the `notifications` table.
//!
//! Selection for dispatch always goes through a claim: a single
//! `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING`
//! that stamps `claimed_until`. Concurrent processor invocations therefore
//! never receive the same row while its lease is live.

use std::collections::BTreeSet;

use courier_core::channels::{Channel, DeliveryStatus};
use courier_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::notification::{DeliveryUpdate, NewNotification, Notification};

/// Column list for `notifications` queries.
const COLUMNS: &str = "\
    id, user_id, notification_type, category, title, message, metadata, \
    channels, priority, delivery_status, scheduled_for, delivered_at, \
    is_read, read_at, retry_count, claimed_until, dead_lettered_at, created_at";

/// Row is free to claim: not delivered, not dead-lettered, no live lease.
/// `$1` is the current instant.
const CLAIMABLE: &str = "\
    delivered_at IS NULL \
    AND dead_lettered_at IS NULL \
    AND (claimed_until IS NULL OR claimed_until < $1)";

/// Provides storage operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert a notification. `channels` must already exclude opted-out
    /// channels; every channel starts `pending`.
    pub async fn insert(
        pool: &PgPool,
        input: &NewNotification,
        channels: &BTreeSet<Channel>,
        scheduled_for: Timestamp,
    ) -> Result<Notification, sqlx::Error> {
        let metadata = input
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        let query = format!(
            "INSERT INTO notifications \
                (user_id, notification_type, category, title, message, metadata, \
                 channels, priority, delivery_status, scheduled_for) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(input.user_id)
            .bind(&input.notification_type)
            .bind(&input.category)
            .bind(&input.title)
            .bind(&input.message)
            .bind(metadata)
            .bind(Json(channels))
            .bind(input.priority.as_str())
            .bind(Json(DeliveryStatus::pending_for(channels)))
            .bind(scheduled_for)
            .fetch_one(pool)
            .await
    }

    /// Find a notification by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1");
        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    /// Claim up to `limit` notifications whose `scheduled_for` has passed.
    pub async fn claim_due(
        pool: &PgPool,
        now: Timestamp,
        lease_until: Timestamp,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications SET claimed_until = $2 \
             WHERE id IN ( \
                 SELECT id FROM notifications \
                 WHERE scheduled_for <= $1 AND {CLAIMABLE} \
                 ORDER BY scheduled_for ASC \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(now)
            .bind(lease_until)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Claim up to `limit` notifications with at least one failed channel,
    /// created before `created_before` and with retry passes left.
    pub async fn claim_failed(
        pool: &PgPool,
        now: Timestamp,
        lease_until: Timestamp,
        created_before: Timestamp,
        max_retries: i16,
        limit: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications SET claimed_until = $2 \
             WHERE id IN ( \
                 SELECT id FROM notifications \
                 WHERE scheduled_for IS NULL \
                   AND created_at < $3 \
                   AND retry_count < $4 \
                   AND EXISTS ( \
                       SELECT 1 FROM jsonb_each_text(delivery_status) AS s(channel, status) \
                       WHERE s.status = 'failed') \
                   AND {CLAIMABLE} \
                 ORDER BY created_at ASC \
                 LIMIT $5 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(now)
            .bind(lease_until)
            .bind(created_before)
            .bind(max_retries)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Claim a single notification if it is due and unclaimed.
    ///
    /// Used for inline dispatch right after insert.
    pub async fn claim_by_id(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let query = format!(
            "UPDATE notifications SET claimed_until = $2 \
             WHERE id = $3 \
               AND (scheduled_for IS NULL OR scheduled_for <= $1) \
               AND {CLAIMABLE} \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(now)
            .bind(lease_until)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Write a dispatch outcome, clear `scheduled_for` and release the lease.
    pub async fn record_delivery(
        pool: &PgPool,
        id: DbId,
        update: &DeliveryUpdate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notifications SET \
                 delivery_status = $2, \
                 delivered_at = $3, \
                 retry_count = retry_count + CASE WHEN $4 THEN 1 ELSE 0 END, \
                 dead_lettered_at = $5, \
                 scheduled_for = NULL, \
                 claimed_until = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(&update.delivery_status))
        .bind(update.delivered_at)
        .bind(update.consumed_retry)
        .bind(update.dead_lettered_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inbox
    // -----------------------------------------------------------------------

    /// List notifications for a user, newest first.
    ///
    /// When `unread_only` is `true`, only notifications with `is_read = false`
    /// are returned.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let filter = if unread_only {
            "AND is_read = false"
        } else {
            ""
        };
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id = $1 {filter} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Unread notifications created at or after `since` (digest window).
    pub async fn list_unread_since(
        pool: &PgPool,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id = $1 AND is_read = false AND created_at >= $2 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    /// Mark a single notification as read.
    ///
    /// Returns `true` if the notification belongs to the user. Marking an
    /// already-read notification is a no-op that still returns `true`.
    pub async fn mark_read(
        pool: &PgPool,
        notification_id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = COALESCE(read_at, NOW()) \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark all unread notifications as read for a user.
    ///
    /// Returns the number of notifications that were marked read.
    pub async fn mark_all_read(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = NOW() \
             WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a notification owned by `user_id`.
    pub async fn delete(
        pool: &PgPool,
        notification_id: DbId,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the number of unread notifications for a user.
    pub async fn unread_count(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }
}
