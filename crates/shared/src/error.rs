//! Shared error types and server error body parsing.

use serde::{Deserialize, Serialize};

/// Error envelope the backend returns on failed `/api/*` calls.
///
/// Older endpoints put the human-readable text in `message`, a few in
/// `error`; both are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Attempt to pull a user-facing message out of a JSON error body.
/// Prefers `message`, falls back to `error`.
pub fn try_server_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ServerMessage>(body).ok()?;
    if let Some(message) = parsed.message {
        if !message.trim().is_empty() {
            return Some(message);
        }
    }
    parsed.error.filter(|e| !e.trim().is_empty())
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (DNS, refused, timeout, reset).
    Network(String),
    Http { status: u16, body: String },
    Deserialize(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Server-provided message for HTTP failures, if the body carried one.
    pub fn server_message(&self) -> Option<String> {
        match self {
            ApiError::Http { body, .. } => try_server_message(body),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Deserialize(msg) => write!(f, "Deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// A realtime frame that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine packet type '{0}'")]
    UnknownEngineType(char),
    #[error("unknown socket packet type '{0}'")]
    UnknownSocketType(char),
    #[error("malformed payload: {0}")]
    Payload(String),
}
