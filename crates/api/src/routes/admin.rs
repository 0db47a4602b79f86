//! Route definitions for `/admin/webhooks`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::webhook;
use crate::state::AppState;

/// Routes mounted at `/admin/webhooks`.
///
/// ```text
/// GET    /             -> list_webhooks
/// POST   /             -> create_webhook
/// GET    /{id}         -> get_webhook
/// PUT    /{id}         -> update_webhook
/// DELETE /{id}         -> delete_webhook
/// GET    /{id}/logs    -> list_webhook_logs
/// POST   /{id}/test    -> test_webhook
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(webhook::list_webhooks).post(webhook::create_webhook))
        .route(
            "/{id}",
            get(webhook::get_webhook)
                .put(webhook::update_webhook)
                .delete(webhook::delete_webhook),
        )
        .route("/{id}/logs", get(webhook::list_webhook_logs))
        .route("/{id}/test", post(webhook::test_webhook))
}
