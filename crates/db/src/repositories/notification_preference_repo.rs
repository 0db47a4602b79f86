//! Repository for the `notification_preferences` table.

use courier_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::preference::{NotificationPreference, PreferenceChanges};

const COLUMNS: &str = "\
    user_id, digest_enabled, digest_time, digest_frequency, digest_days, \
    channel_opt_outs, digest_last_sent_at, created_at, updated_at";

/// Provides access to per-user delivery and digest preferences.
pub struct NotificationPreferenceRepo;

impl NotificationPreferenceRepo {
    /// Get a user's stored preferences, if any.
    pub async fn get(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<NotificationPreference>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_preferences WHERE user_id = $1");
        sqlx::query_as::<_, NotificationPreference>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or update preferences in one round-trip.
    ///
    /// Absent fields keep the stored value, or the column default on insert.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        changes: &PreferenceChanges,
    ) -> Result<NotificationPreference, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_preferences \
                (user_id, digest_enabled, digest_time, digest_frequency, digest_days, channel_opt_outs) \
             VALUES ($1, COALESCE($2, false), COALESCE($3, TIME '08:00'), \
                     COALESCE($4, 'daily'), COALESCE($5, '{{}}'::SMALLINT[]), \
                     COALESCE($6, '[]'::JSONB)) \
             ON CONFLICT (user_id) DO UPDATE SET \
                digest_enabled = COALESCE($2, notification_preferences.digest_enabled), \
                digest_time = COALESCE($3, notification_preferences.digest_time), \
                digest_frequency = COALESCE($4, notification_preferences.digest_frequency), \
                digest_days = COALESCE($5, notification_preferences.digest_days), \
                channel_opt_outs = COALESCE($6, notification_preferences.channel_opt_outs), \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationPreference>(&query)
            .bind(user_id)
            .bind(changes.digest_enabled)
            .bind(changes.digest_time)
            .bind(changes.digest_frequency.map(|f| f.as_str()))
            .bind(changes.digest_days.as_deref())
            .bind(changes.channel_opt_outs.as_ref().map(Json))
            .fetch_one(pool)
            .await
    }

    /// All users with digests switched on.
    pub async fn list_digest_enabled(
        pool: &PgPool,
    ) -> Result<Vec<NotificationPreference>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_preferences \
             WHERE digest_enabled = true ORDER BY user_id"
        );
        sqlx::query_as::<_, NotificationPreference>(&query)
            .fetch_all(pool)
            .await
    }

    /// Claim the digest slot for the minute starting at `slot_start`.
    ///
    /// Returns `false` when another run already sent this slot.
    pub async fn claim_digest(
        pool: &PgPool,
        user_id: DbId,
        slot_start: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_preferences SET digest_last_sent_at = $3 \
             WHERE user_id = $1 \
               AND (digest_last_sent_at IS NULL OR digest_last_sent_at < $2)",
        )
        .bind(user_id)
        .bind(slot_start)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
