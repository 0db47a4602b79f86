use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use courier_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

pub struct WsConnection {
    pub user_id: DbId,
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Registry of live WebSocket connections, shared behind `Arc`.
///
/// Notification frames flow through each connection's own feed
/// subscription; the registry carries control frames (ping, close).
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver for its control frames.
    pub async fn add(&self, conn_id: String, user_id: DbId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            user_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Number of open connections for `user_id`.
    pub async fn user_connection_count(&self, user_id: DbId) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.user_id == user_id)
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_connections_per_user() {
        let manager = WsManager::new();
        let _a = manager.add("a".into(), 1).await;
        let _b = manager.add("b".into(), 1).await;
        let _c = manager.add("c".into(), 2).await;

        assert_eq!(manager.connection_count().await, 3);
        assert_eq!(manager.user_connection_count(1).await, 2);

        manager.remove("a").await;
        assert_eq!(manager.user_connection_count(1).await, 1);
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let manager = WsManager::new();
        let mut rx = manager.add("a".into(), 1).await;

        manager.shutdown_all().await;

        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert_eq!(manager.connection_count().await, 0);
    }
}
