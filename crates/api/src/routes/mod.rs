pub mod admin;
pub mod health;
pub mod internal;
pub mod notification;

use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws?token=                                       WebSocket realtime feed
///
/// /notifications                                   inbox (user)
/// /internal                                        triggers + producers (service/admin)
/// /admin/webhooks                                  webhook management (admin)
/// ```
///
/// `timeout` wraps every route except `/internal`. Invocations there run to
/// completion under their own deadlines (webhook overall deadline, claim
/// leases).
pub fn api_routes(timeout: TimeoutLayer) -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/notifications", notification::router())
        .nest("/admin/webhooks", admin::router())
        .layer(timeout)
        .nest("/internal", internal::router())
}
