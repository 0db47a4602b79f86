//! Repository for the `webhooks` table.

use courier_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::webhook::{
    CreateWebhook, UpdateWebhook, WebhookConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECONDS,
};

const COLUMNS: &str = "\
    id, name, url, secret, events, is_active, max_retries, retry_delay_seconds, \
    total_calls, failed_calls, last_triggered_at, created_at, updated_at";

/// Provides CRUD and counter operations for webhook subscriptions.
pub struct WebhookRepo;

impl WebhookRepo {
    /// Create a new webhook.
    pub async fn create(pool: &PgPool, input: &CreateWebhook) -> Result<WebhookConfig, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhooks \
                (name, url, secret, events, is_active, max_retries, retry_delay_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookConfig>(&query)
            .bind(&input.name)
            .bind(&input.url)
            .bind(input.secret.as_deref())
            .bind(&input.events)
            .bind(input.is_active.unwrap_or(true))
            .bind(input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES))
            .bind(input.retry_delay_seconds.unwrap_or(DEFAULT_RETRY_DELAY_SECONDS))
            .fetch_one(pool)
            .await
    }

    /// List all webhooks in registration order.
    pub async fn list(pool: &PgPool) -> Result<Vec<WebhookConfig>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM webhooks ORDER BY id ASC");
        sqlx::query_as::<_, WebhookConfig>(&query)
            .fetch_all(pool)
            .await
    }

    /// Active webhooks subscribed to `event_type`, in registration order.
    pub async fn list_active_for_event(
        pool: &PgPool,
        event_type: &str,
    ) -> Result<Vec<WebhookConfig>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM webhooks \
             WHERE is_active = true AND $1 = ANY(events) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, WebhookConfig>(&query)
            .bind(event_type)
            .fetch_all(pool)
            .await
    }

    /// Find a webhook by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WebhookConfig>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM webhooks WHERE id = $1");
        sqlx::query_as::<_, WebhookConfig>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update a webhook's settings. Absent fields are left unchanged; an
    /// empty `secret` clears it.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateWebhook,
    ) -> Result<Option<WebhookConfig>, sqlx::Error> {
        let query = format!(
            "UPDATE webhooks SET \
                 name = COALESCE($2, name), \
                 url = COALESCE($3, url), \
                 secret = CASE WHEN $4::text IS NULL THEN secret \
                               WHEN $4 = '' THEN NULL ELSE $4 END, \
                 events = COALESCE($5, events), \
                 is_active = COALESCE($6, is_active), \
                 max_retries = COALESCE($7, max_retries), \
                 retry_delay_seconds = COALESCE($8, retry_delay_seconds), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookConfig>(&query)
            .bind(id)
            .bind(input.name.as_deref())
            .bind(input.url.as_deref())
            .bind(input.secret.as_deref())
            .bind(input.events.as_deref())
            .bind(input.is_active)
            .bind(input.max_retries)
            .bind(input.retry_delay_seconds)
            .fetch_optional(pool)
            .await
    }

    /// Delete a webhook by ID. Cascade deletes its logs.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    /// Count one successful call and stamp `last_triggered_at`.
    pub async fn record_success(pool: &PgPool, id: DbId, at: Timestamp) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE webhooks SET total_calls = total_calls + 1, last_triggered_at = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Count one call that ended without success.
    pub async fn record_failure(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhooks SET failed_calls = failed_calls + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
