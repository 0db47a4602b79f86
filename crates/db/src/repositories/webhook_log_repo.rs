//! Repository for the append-only `webhook_logs` table.
//!
//! There is deliberately no update or delete method.

use courier_core::types::DbId;
use sqlx::PgPool;

use crate::models::webhook::{NewWebhookLog, WebhookLog};

const COLUMNS: &str = "\
    id, webhook_id, event_type, notification_id, payload, status_code, \
    response_body, error_message, success, attempt_number, created_at";

pub struct WebhookLogRepo;

impl WebhookLogRepo {
    /// Append one attempt record.
    pub async fn append(pool: &PgPool, entry: &NewWebhookLog) -> Result<WebhookLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_logs \
                (webhook_id, event_type, notification_id, payload, status_code, \
                 response_body, error_message, success, attempt_number) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookLog>(&query)
            .bind(entry.webhook_id)
            .bind(&entry.event_type)
            .bind(entry.notification_id)
            .bind(&entry.payload)
            .bind(entry.status_code)
            .bind(entry.response_body.as_deref())
            .bind(entry.error_message.as_deref())
            .bind(entry.success)
            .bind(entry.attempt_number)
            .fetch_one(pool)
            .await
    }

    /// Attempts for one webhook, newest first.
    pub async fn list_for_webhook(
        pool: &PgPool,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM webhook_logs \
             WHERE webhook_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, WebhookLog>(&query)
            .bind(webhook_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
