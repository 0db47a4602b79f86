//! Shared response envelope types for API handlers.
//!
//! Inbox and admin responses use a `{ "data": ... }` envelope. Invocation
//! endpoints under `/internal` return their run report unwrapped.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
