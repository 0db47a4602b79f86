//! WebSocket realtime feed.
//!
//! Each authenticated connection subscribes to the
//! [`NotificationFeed`](courier_events::NotificationFeed) for its user and
//! receives `{"type":"notification","data":…}` frames.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{notification_frame, ws_handler};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
