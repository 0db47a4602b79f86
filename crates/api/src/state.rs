use std::sync::Arc;

use courier_events::Engine;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Stores, feed, bus and every delivery component.
    pub engine: Engine,
    pub config: Arc<ServerConfig>,
    /// Live WebSocket sessions.
    pub ws_manager: Arc<WsManager>,
}
