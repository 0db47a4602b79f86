//! Admin handlers for webhook subscriptions and their delivery logs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use courier_core::error::CoreError;
use courier_core::event_types::WEBHOOK_TEST;
use courier_core::types::DbId;
use courier_db::models::webhook::{CreateWebhook, UpdateWebhook, WebhookConfig, WebhookLog};
use courier_events::service::clamp_limit;
use courier_events::WebhookResult;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::run_detached;
use crate::middleware::rbac::RequireAdmin;
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Webhook",
        id,
    })
}

/// GET /api/v1/admin/webhooks
pub async fn list_webhooks(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<WebhookConfig>>>> {
    let webhooks = state.engine.stores.webhooks.list().await?;
    Ok(Json(DataResponse { data: webhooks }))
}

/// POST /api/v1/admin/webhooks
pub async fn create_webhook(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateWebhook>,
) -> AppResult<(StatusCode, Json<DataResponse<WebhookConfig>>)> {
    input.validate()?;
    let webhook = state.engine.stores.webhooks.create(&input).await?;
    tracing::info!(
        webhook_id = webhook.id,
        admin_id = admin.user_id,
        events = ?webhook.events,
        "Webhook created"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: webhook })))
}

/// GET /api/v1/admin/webhooks/{id}
pub async fn get_webhook(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WebhookConfig>>> {
    let webhook = state
        .engine
        .stores
        .webhooks
        .find_by_id(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: webhook }))
}

/// PUT /api/v1/admin/webhooks/{id}
pub async fn update_webhook(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateWebhook>,
) -> AppResult<Json<DataResponse<WebhookConfig>>> {
    input.validate()?;
    let webhook = state
        .engine
        .stores
        .webhooks
        .update(id, &input)
        .await?
        .ok_or_else(|| not_found(id))?;
    tracing::info!(webhook_id = id, admin_id = admin.user_id, "Webhook updated");
    Ok(Json(DataResponse { data: webhook }))
}

/// DELETE /api/v1/admin/webhooks/{id}
///
/// Also removes the subscription's logs.
pub async fn delete_webhook(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !state.engine.stores.webhooks.delete(id).await? {
        return Err(not_found(id));
    }
    tracing::info!(webhook_id = id, admin_id = admin.user_id, "Webhook deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/webhooks/{id}/logs
///
/// Newest attempts first.
pub async fn list_webhook_logs(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<WebhookLog>>>> {
    if state.engine.stores.webhooks.find_by_id(id).await?.is_none() {
        return Err(not_found(id));
    }
    let logs = state
        .engine
        .stores
        .webhook_logs
        .list_for_webhook(id, clamp_limit(params.limit), params.offset())
        .await?;
    Ok(Json(DataResponse { data: logs }))
}

/// POST /api/v1/admin/webhooks/{id}/test
///
/// Send a `webhook.test` event to this subscription only, regardless of
/// its event filter and active flag. Attempts are logged like any other.
pub async fn test_webhook(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WebhookResult>>> {
    let webhook = state
        .engine
        .stores
        .webhooks
        .find_by_id(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    let payload = serde_json::json!({
        "webhook_id": webhook.id,
        "message": "Test delivery from courier",
        "requested_by": admin.user_id,
    });
    let webhooks = Arc::clone(&state.engine.webhooks);
    let result =
        run_detached(async move { webhooks.deliver_one(&webhook, WEBHOOK_TEST, &payload).await })
            .await?;
    Ok(Json(DataResponse { data: result }))
}
