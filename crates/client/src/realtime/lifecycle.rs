//! Connection lifecycle events and the banners they produce.

use crate::notify::Banner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    ConnectError { message: String, auth_rejected: bool },
    /// The server refused the namespace for a reason other than the
    /// credential. No retry follows.
    ConnectRejected { message: String },
    Disconnected { reason: String },
    Reconnected { attempts: u32 },
    ReconnectError { attempt: u32, message: String },
    /// Reconnection attempts are exhausted; only a manual reload helps now.
    ReconnectFailed { attempts: u32 },
}

/// Whether a connection error text means the server refused the credential.
pub fn is_auth_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("authentication") || lower.contains("unauthorized") || lower.contains("401")
}

impl LifecycleEvent {
    pub fn connect_error(message: impl Into<String>) -> Self {
        let message = message.into();
        LifecycleEvent::ConnectError {
            auth_rejected: is_auth_rejection(&message),
            message,
        }
    }

    /// A refused namespace connect. Auth refusals keep the login prompt.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_auth_rejection(&message) {
            LifecycleEvent::ConnectError {
                message,
                auth_rejected: true,
            }
        } else {
            LifecycleEvent::ConnectRejected { message }
        }
    }

    pub fn banner(&self) -> Banner {
        match self {
            LifecycleEvent::Connected => Banner::success("Connected to notification system"),
            LifecycleEvent::ConnectError {
                auth_rejected: true,
                ..
            } => Banner::error("Authentication error: Please log in again"),
            LifecycleEvent::ConnectError { .. } => Banner::error("Connection error: Retrying..."),
            LifecycleEvent::ConnectRejected { message } => {
                Banner::error(format!("Connection rejected: {message}"))
            }
            LifecycleEvent::Disconnected { .. } => {
                Banner::error("Disconnected from notification system")
            }
            LifecycleEvent::Reconnected { .. } => {
                Banner::success("Reconnected to notification system")
            }
            LifecycleEvent::ReconnectError { attempt, .. } => {
                Banner::error(format!("Reconnection attempt {attempt} failed. Retrying..."))
            }
            LifecycleEvent::ReconnectFailed { .. } => {
                Banner::error("Failed to reconnect. Please refresh the page.")
            }
        }
    }
}
