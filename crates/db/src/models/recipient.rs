//! Recipient address book used by the email and push senders.

use courier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `notification_recipients` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Recipient {
    pub user_id: DbId,
    pub email: Option<String>,
    pub push_token: Option<String>,
    pub updated_at: Timestamp,
}

/// DTO for registering a user's contact addresses. `None` clears a field.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpsertRecipient {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 4096))]
    pub push_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_email() {
        let dto = UpsertRecipient {
            email: Some("not-an-address".into()),
            push_token: None,
        };
        assert!(dto.validate().unwrap_err().field_errors().contains_key("email"));

        let ok = UpsertRecipient {
            email: Some("ops@example.com".into()),
            push_token: Some("device-token".into()),
        };
        assert!(ok.validate().is_ok());
    }
}
