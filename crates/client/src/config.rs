//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use cribz_shared::{SOCKET_IO_PATH, SOCKET_IO_QUERY};
use url::Url;

use crate::realtime::{RealtimeConfig, ReconnectConfig};
use crate::retry::RetryPolicy;

/// Production backend, used when `CRIBZ_API_BASE_URL` is not set.
pub const DEFAULT_API_BASE_URL: &str = "https://real-estate-backend-d9es.onrender.com";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin of the REST API, without the `/api` suffix.
    pub api_base_url: String,
    /// Origin of the realtime endpoint. Defaults to the API origin.
    pub realtime_url: Option<String>,
    /// Directory for persisted session state. Defaults to the platform
    /// config dir.
    pub storage_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub reconnect: ReconnectConfig,
    /// Refuse to open the realtime channel over plain `ws://`.
    pub require_secure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            realtime_url: None,
            storage_dir: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            reconnect: ReconnectConfig::default(),
            require_secure: true,
        }
    }
}

impl ClientConfig {
    /// Build a config for the given API origin with default settings.
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CRIBZ_API_BASE_URL`: REST API origin (default: the production backend)
    /// - `CRIBZ_REALTIME_URL`: realtime origin (default: same as the API)
    /// - `CRIBZ_STORAGE_DIR`: session storage directory (default: platform config dir)
    /// - `CRIBZ_REQUIRE_SECURE`: "false" allows `ws://` realtime (default: "true")
    /// - `CRIBZ_REQUEST_TIMEOUT_SECS`: per-request HTTP timeout (default: 30)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("CRIBZ_API_BASE_URL") {
            if !base.trim().is_empty() {
                config.api_base_url = base.trim().trim_end_matches('/').to_string();
            }
        }
        config.realtime_url = std::env::var("CRIBZ_REALTIME_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        config.storage_dir = std::env::var("CRIBZ_STORAGE_DIR").ok().map(PathBuf::from);
        config.require_secure = std::env::var("CRIBZ_REQUIRE_SECURE")
            .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);
        if let Some(secs) = std::env::var("CRIBZ_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Socket.IO WebSocket endpoint derived from the realtime (or API) origin.
    pub fn realtime_endpoint(&self) -> Result<Url, url::ParseError> {
        let origin = self.realtime_url.as_deref().unwrap_or(&self.api_base_url);
        let mut url = Url::parse(origin)?;

        let ws_scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // http(s) and ws(s) are all special schemes, so this cannot fail
        let _ = url.set_scheme(ws_scheme);
        url.set_path(SOCKET_IO_PATH);
        url.set_query(Some(SOCKET_IO_QUERY));
        Ok(url)
    }

    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            endpoint: self.realtime_endpoint().map_err(|e| e.to_string()),
            reconnect: self.reconnect.clone(),
            require_secure: self.require_secure,
        }
    }
}
