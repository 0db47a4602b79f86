use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use courier_db::models::notification::Notification;
use courier_events::FeedSubscription;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Access token; browsers cannot set headers on WebSocket upgrades.
    pub token: String,
}

/// `GET /api/v1/ws?token=<jwt>`: authenticate, then upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let user = AuthUser::from_token(&params.token, &state.config.jwt)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

/// Serialize a notification into the frame sent to clients.
pub fn notification_frame(notification: &Notification) -> Result<Message, serde_json::Error> {
    let frame = serde_json::json!({
        "type": "notification",
        "data": notification,
    });
    Ok(Message::Text(serde_json::to_string(&frame)?.into()))
}

/// Manage a single connection after upgrade.
///
/// The sender task merges control frames from the [`WsManager`](super::WsManager)
/// with the user's feed subscription; the current task drains inbound frames
/// until the client goes away.
async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id = user.user_id, "WebSocket connected");

    let mut control = state.ws_manager.add(conn_id.clone(), user.user_id).await;
    let mut feed: FeedSubscription = state.engine.feed.subscribe(user.user_id);

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                frame = control.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                notification = feed.recv() => match notification {
                    Some(n) => match notification_frame(&n) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(notification_id = n.id, error = %e, "Failed to encode notification frame");
                            continue;
                        }
                    },
                    None => break,
                },
            };
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
