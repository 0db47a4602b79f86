//! Repository for the `notification_recipients` address book.

use courier_core::types::DbId;
use sqlx::PgPool;

use crate::models::recipient::Recipient;

const COLUMNS: &str = "user_id, email, push_token, updated_at";

pub struct RecipientRepo;

impl RecipientRepo {
    pub async fn find(pool: &PgPool, user_id: DbId) -> Result<Option<Recipient>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_recipients WHERE user_id = $1");
        sqlx::query_as::<_, Recipient>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace a user's contact addresses.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        email: Option<&str>,
        push_token: Option<&str>,
    ) -> Result<Recipient, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_recipients (user_id, email, push_token) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                email = EXCLUDED.email, \
                push_token = EXCLUDED.push_token, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Recipient>(&query)
            .bind(user_id)
            .bind(email)
            .bind(push_token)
            .fetch_one(pool)
            .await
    }
}
