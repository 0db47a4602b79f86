//! Route definitions for `/internal`.

use axum::routing::{post, put};
use axum::Router;

use crate::handlers::internal;
use crate::state::AppState;

/// Routes mounted at `/internal`.
///
/// ```text
/// POST /process-queue           -> process_queue
/// POST /send-digests            -> send_digests
/// POST /dispatch-webhook        -> dispatch_webhook
/// POST /notifications           -> create_notification
/// PUT  /recipients/{user_id}    -> upsert_recipient
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process-queue", post(internal::process_queue))
        .route("/send-digests", post(internal::send_digests))
        .route("/dispatch-webhook", post(internal::dispatch_webhook))
        .route("/notifications", post(internal::create_notification))
        .route("/recipients/{user_id}", put(internal::upsert_recipient))
}
