//! Session-level errors surfaced to UI collaborators.

use cribz_shared::ApiError;

pub const NETWORK_UNREACHABLE: &str =
    "Network error: Please check your internet connection and try again.";
pub const SERVER_UNAVAILABLE: &str = "Server is currently unavailable. Please try again later.";
pub const INVALID_CREDENTIALS: &str =
    "Invalid email or password. Please check your credentials and try again.";
pub const MISSING_TOKEN: &str = "Login failed: authentication token not received from server";
pub const NO_LOCAL_TOKEN: &str = "No authentication token found";
pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
pub const PROFILE_FETCH_FAILED: &str = "Failed to fetch user profile";
pub const PROFILE_UPDATE_FAILED: &str = "Failed to update profile";
pub const REGISTRATION_FAILED: &str = "Registration failed. Please try again.";
pub const UNPROCESSABLE_RESPONSE: &str = "Unable to process server response. Please try again.";
pub const SESSION_NOT_SAVED: &str = "Unable to save your session. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Credentials or authorization rejected, or no usable token.
    #[error("{0}")]
    Auth(String),
    /// The server could not be reached, after retries.
    #[error("{0}")]
    Network(String),
    /// The server answered with something this client cannot use.
    #[error("{0}")]
    Protocol(String),
    /// A logout or newer login happened while this request was in flight.
    #[error("Session changed while the request was in flight")]
    Superseded,
}

impl SessionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SessionError::Auth(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SessionError::Network(_))
    }

    /// Map a transport failure to what the user sees.
    ///
    /// Connectivity failures are rewritten to a generic message; HTTP
    /// failures keep the server's own message when it sent one.
    pub(crate) fn from_api(err: ApiError, unauthorized_fallback: &str) -> Self {
        let server_message = err.server_message();
        match err {
            ApiError::Network(detail) => {
                tracing::debug!("Network failure: {}", detail);
                SessionError::Network(NETWORK_UNREACHABLE.to_string())
            }
            ApiError::Http { status: 401, .. } => SessionError::Auth(
                server_message.unwrap_or_else(|| unauthorized_fallback.to_string()),
            ),
            ApiError::Http { status, .. } => SessionError::Auth(
                server_message.unwrap_or_else(|| format!("Server error: HTTP status {status}")),
            ),
            ApiError::Deserialize(detail) => {
                SessionError::Protocol(format!("Unexpected response from server: {detail}"))
            }
        }
    }
}
