//! Invocation endpoints for the scheduler and business-event producers.
//!
//! All endpoints require the `service` or `admin` role. Processing triggers
//! run one pass to completion on a detached task and return its report.
//! These routes are not under the request timeout.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use courier_core::error::CoreError;
use courier_core::types::DbId;
use courier_db::models::notification::{NewNotification, Notification};
use courier_db::models::recipient::{Recipient, UpsertRecipient};
use courier_events::{DigestReport, DispatchReport, ProcessReport};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::run_detached;
use crate::middleware::rbac::RequireService;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/internal/process-queue
pub async fn process_queue(
    RequireService(caller): RequireService,
    State(state): State<AppState>,
) -> AppResult<Json<ProcessReport>> {
    tracing::info!(caller = caller.user_id, "Queue processing triggered");
    let processor = Arc::clone(&state.engine.processor);
    let report = run_detached(async move { processor.run_once(Utc::now()).await }).await??;
    Ok(Json(report))
}

/// POST /api/v1/internal/send-digests
pub async fn send_digests(
    RequireService(caller): RequireService,
    State(state): State<AppState>,
) -> AppResult<Json<DigestReport>> {
    tracing::info!(caller = caller.user_id, "Digest run triggered");
    let digests = Arc::clone(&state.engine.digests);
    let report = run_detached(async move { digests.run_once(Utc::now()).await }).await??;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct DispatchWebhookRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub notification_id: Option<DbId>,
}

/// POST /api/v1/internal/dispatch-webhook
///
/// Delivers synchronously; the response carries every subscription's
/// outcome.
pub async fn dispatch_webhook(
    RequireService(caller): RequireService,
    State(state): State<AppState>,
    Json(input): Json<DispatchWebhookRequest>,
) -> AppResult<Json<DispatchReport>> {
    let event_type = input.event_type.trim().to_string();
    if event_type.is_empty() {
        return Err(CoreError::Validation("event_type must not be empty".into()).into());
    }

    let webhooks = Arc::clone(&state.engine.webhooks);
    let dispatched_type = event_type.clone();
    let report = run_detached(async move {
        webhooks
            .dispatch(&dispatched_type, &input.payload, input.notification_id)
            .await
    })
    .await??;
    tracing::info!(
        caller = caller.user_id,
        event_type = %event_type,
        dispatched = report.dispatched,
        "Webhook dispatch requested"
    );
    Ok(Json(report))
}

/// POST /api/v1/internal/notifications
///
/// Create a notification for a user; due notifications are dispatched
/// before the response is sent.
pub async fn create_notification(
    RequireService(caller): RequireService,
    State(state): State<AppState>,
    Json(input): Json<NewNotification>,
) -> AppResult<(StatusCode, Json<DataResponse<Notification>>)> {
    let service = Arc::clone(&state.engine.notifications);
    let notification = run_detached(async move { service.create(input).await }).await??;
    tracing::debug!(
        caller = caller.user_id,
        notification_id = notification.id,
        "Notification created via API"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: notification })))
}

/// PUT /api/v1/internal/recipients/{user_id}
///
/// Register the email address and push token used by those channels.
pub async fn upsert_recipient(
    RequireService(_caller): RequireService,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
    Json(input): Json<UpsertRecipient>,
) -> AppResult<Json<DataResponse<Recipient>>> {
    input.validate()?;
    let recipient = state
        .engine
        .stores
        .recipients
        .upsert(user_id, input.email.as_deref(), input.push_token.as_deref())
        .await?;
    Ok(Json(DataResponse { data: recipient }))
}
