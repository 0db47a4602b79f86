//! Route definitions for the `/notifications` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::notification;
use crate::state::AppState;

/// Routes mounted at `/notifications`.
///
/// ```text
/// GET    /                 -> list_notifications
/// GET    /unread-count     -> unread_count
/// POST   /read-all         -> mark_all_read
/// POST   /{id}/read        -> mark_read
/// DELETE /{id}             -> delete_notification
/// GET    /preferences      -> get_preferences
/// PUT    /preferences      -> update_preferences
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(notification::list_notifications))
        .route("/unread-count", get(notification::unread_count))
        .route("/read-all", post(notification::mark_all_read))
        .route("/{id}/read", post(notification::mark_read))
        .route("/{id}", delete(notification::delete_notification))
        .route(
            "/preferences",
            get(notification::get_preferences).put(notification::update_preferences),
        )
}
