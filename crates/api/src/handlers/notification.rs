//! Handlers for the `/notifications` inbox and preferences.
//!
//! Every endpoint acts on the authenticated user's own rows.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use courier_core::types::DbId;
use courier_db::models::notification::Notification;
use courier_db::models::preference::{NotificationPreference, UpdatePreference};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /notifications`.
#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    /// Defaults to 20, capped at 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked_read: u64,
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NotificationQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let notifications = state
        .engine
        .notifications
        .list(auth.user_id, params.unread_only, params.limit, params.offset)
        .await?;
    Ok(Json(DataResponse {
        data: notifications,
    }))
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UnreadCount>>> {
    let count = state.engine.notifications.unread_count(auth.user_id).await?;
    Ok(Json(DataResponse {
        data: UnreadCount { count },
    }))
}

/// POST /api/v1/notifications/{id}/read
///
/// 204 on success, 404 if the notification is not the caller's.
pub async fn mark_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(notification_id): Path<DbId>,
) -> AppResult<StatusCode> {
    state
        .engine
        .notifications
        .mark_read(notification_id, auth.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MarkedRead>>> {
    let marked_read = state.engine.notifications.mark_all_read(auth.user_id).await?;
    Ok(Json(DataResponse {
        data: MarkedRead { marked_read },
    }))
}

/// DELETE /api/v1/notifications/{id}
pub async fn delete_notification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(notification_id): Path<DbId>,
) -> AppResult<StatusCode> {
    state
        .engine
        .notifications
        .delete(notification_id, auth.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/notifications/preferences
///
/// Users without a stored row get the defaults (digest off, no opt-outs).
pub async fn get_preferences(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<NotificationPreference>>> {
    let pref = state.engine.notifications.preferences(auth.user_id).await?;
    Ok(Json(DataResponse { data: pref }))
}

/// PUT /api/v1/notifications/preferences
pub async fn update_preferences(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<UpdatePreference>,
) -> AppResult<Json<DataResponse<NotificationPreference>>> {
    let pref = state
        .engine
        .notifications
        .update_preferences(auth.user_id, input)
        .await?;
    Ok(Json(DataResponse { data: pref }))
}
