//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod notification_preference_repo;
pub mod notification_repo;
pub mod recipient_repo;
pub mod webhook_log_repo;
pub mod webhook_repo;

pub use notification_preference_repo::NotificationPreferenceRepo;
pub use notification_repo::NotificationRepo;
pub use recipient_repo::RecipientRepo;
pub use webhook_log_repo::WebhookLogRepo;
pub use webhook_repo::WebhookRepo;
