//! Webhook delivery error taxonomy.

use serde::Serialize;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network failures, timeouts, 5xx, 408 and 429. Worth retrying.
    Transient,
    /// Other non-2xx answers. The endpoint rejected the request.
    Permanent,
    /// The subscription itself is broken (invalid URL, unbuildable request).
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Endpoint returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Invalid webhook configuration: {0}")]
    Configuration(String),
}

impl DeliveryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout | Self::Network(_) => ErrorClass::Transient,
            Self::Status { status, .. } => classify_status(*status),
            Self::Configuration(_) => ErrorClass::Configuration,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Configuration(e.to_string())
        } else if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Class of a non-2xx HTTP status.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 | 500..=599 => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}
