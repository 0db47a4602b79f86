//! Well-known role names carried in access-token claims.

/// Administrators manage webhook subscriptions and may trigger jobs.
pub const ROLE_ADMIN: &str = "admin";

/// Internal callers (scheduler, business services) that trigger processing
/// runs and produce notifications.
pub const ROLE_SERVICE: &str = "service";

/// Regular end users; may only touch their own inbox.
pub const ROLE_USER: &str = "user";
