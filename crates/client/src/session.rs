//! Authentication session: token lifecycle, login/registration and the
//! cached profile.
//!
//! The token and profile live in [`Storage`] under fixed keys so they survive
//! restarts. Every request that gets a 401 raises the unauthorized signal
//! (see [`SessionManager::subscribe_unauthorized`]); what to do about it is
//! left to the UI.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use cribz_shared::{
    try_server_message, ApiError, Credentials, HealthResponse, LoginResponse, Profile,
    ProfileUpdate, RegisterRequest, RegisterResponse,
};
use tokio::sync::broadcast;

use crate::api_client::ApiClient;
use crate::error::*;
use crate::retry::{with_retry, RetryPolicy};
use crate::storage::{load_json, save_json, Storage};
use crate::token;

pub const TOKEN_KEY: &str = "token";
pub const USER_DATA_KEY: &str = "userData";
pub const NEW_USER_KEY: &str = "isNewUser";

const HEALTH_PATH: &str = "/api/health";
const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const PROFILE_PATH: &str = "/api/profile";

/// The client-held credential and profile of a logged-in user.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<Profile>,
}

impl Session {
    fn new(token: &str, user: Option<Profile>) -> Self {
        Self {
            token: token.to_string(),
            expires_at: token::expires_at(token),
            user,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Raised whenever the server rejects the current credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unauthorized {
    pub url: String,
}

pub struct SessionManager {
    api: ApiClient,
    storage: Arc<dyn Storage>,
    retry: RetryPolicy,
    /// Advanced by every login and logout. A request only commits its result
    /// if the epoch it started under is still current.
    epoch: Mutex<u64>,
    unauthorized: broadcast::Sender<Unauthorized>,
}

impl SessionManager {
    pub fn new(api: ApiClient, storage: Arc<dyn Storage>, retry: RetryPolicy) -> Self {
        let (unauthorized, _) = broadcast::channel(16);
        Self {
            api,
            storage,
            retry,
            epoch: Mutex::new(0),
            unauthorized,
        }
    }

    fn epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch()
    }

    /// Run `commit` only if no login/logout happened since `ticket` was taken.
    fn commit_if_current<T>(&self, ticket: u64, commit: impl FnOnce() -> T) -> Result<T, SessionError> {
        let epoch = self.epoch();
        if *epoch != ticket {
            tracing::warn!("Discarding stale session result (epoch {} != {})", ticket, *epoch);
            return Err(SessionError::Superseded);
        }
        Ok(commit())
    }

    pub(crate) fn raise_unauthorized(&self, path: &str) {
        let url = self.api.url(path);
        tracing::warn!("Credential rejected by {}", url);
        // No receivers just means nobody is listening yet
        let _ = self.unauthorized.send(Unauthorized { url });
    }

    /// Subscribe to the application-wide unauthorized signal.
    pub fn subscribe_unauthorized(&self) -> broadcast::Receiver<Unauthorized> {
        self.unauthorized.subscribe()
    }

    // --- Local state ---

    /// Store a token. Empty and placeholder tokens clear the stored one
    /// instead. Returns whether a token was stored.
    pub fn set_token(&self, raw: &str) -> bool {
        let Some(token) = token::sanitize(raw) else {
            tracing::error!("Refusing to store empty or placeholder token");
            self.storage.remove(TOKEN_KEY);
            return false;
        };
        if !self.storage.set(TOKEN_KEY, token) {
            return false;
        }
        match token::expires_at(token) {
            Some(exp) => tracing::debug!("Auth token saved. Expires at: {}", exp),
            None => tracing::debug!("Auth token saved (no decodable expiry)"),
        }
        true
    }

    /// The stored token, if it is usable.
    pub fn token(&self) -> Option<String> {
        let raw = self.storage.get(TOKEN_KEY)?;
        token::sanitize(&raw).map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn cached_profile(&self) -> Option<Profile> {
        load_json(self.storage.as_ref(), USER_DATA_KEY)
    }

    pub fn session(&self) -> Option<Session> {
        let token = self.token()?;
        Some(Session::new(&token, self.cached_profile()))
    }

    fn store_profile(&self, profile: Option<&Profile>) -> bool {
        match profile {
            Some(profile) => save_json(self.storage.as_ref(), USER_DATA_KEY, profile),
            None => {
                self.storage.remove(USER_DATA_KEY);
                true
            }
        }
    }

    /// Read and clear the marker set by a successful registration.
    pub fn take_new_user_marker(&self) -> bool {
        let is_new = self.storage.get(NEW_USER_KEY).as_deref() == Some("true");
        if is_new {
            self.storage.remove(NEW_USER_KEY);
        }
        is_new
    }

    /// Clear token and cached profile. Requests still in flight will not
    /// commit their results.
    pub fn logout(&self) {
        let mut epoch = self.epoch();
        *epoch += 1;
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(USER_DATA_KEY);
        tracing::info!("Logged out");
    }

    // --- Remote operations ---

    /// True only if the health endpoint answers 2xx with `status: "OK"`.
    pub async fn check_server_health(&self) -> bool {
        tracing::debug!("Checking server health at {}", self.api.url(HEALTH_PATH));
        match self.api.get_json::<HealthResponse>(HEALTH_PATH).await {
            Ok(health) => {
                if !health.is_healthy() {
                    tracing::warn!("Server reports status '{}'", health.status);
                }
                health.is_healthy()
            }
            Err(e) => {
                tracing::error!("Server health check failed: {}", e);
                false
            }
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let ticket = {
            let mut epoch = self.epoch();
            *epoch += 1;
            *epoch
        };

        if !self.check_server_health().await {
            return Err(SessionError::Auth(SERVER_UNAVAILABLE.to_string()));
        }

        tracing::info!("Attempting login for {}", credentials.email);
        let api = &self.api;
        let response: LoginResponse = self
            .retry
            .run("login", move || {
                api.post_json::<_, LoginResponse>(LOGIN_PATH, credentials)
            })
            .await
            .map_err(|e| SessionError::from_api(e, INVALID_CREDENTIALS))?;

        let Some(token) = response.token.as_deref().and_then(token::sanitize) else {
            tracing::error!("Login response missing token");
            return Err(SessionError::Protocol(MISSING_TOKEN.to_string()));
        };

        let saved = self.commit_if_current(ticket, || {
            self.set_token(token) && self.store_profile(response.user.as_ref())
        })?;
        if !saved {
            // Never leave half a session behind
            self.storage.remove(TOKEN_KEY);
            self.storage.remove(USER_DATA_KEY);
            tracing::error!("Could not persist session for {}", credentials.email);
            return Err(SessionError::Protocol(SESSION_NOT_SAVED.to_string()));
        }

        tracing::info!("Logged in as {}", credentials.email);
        Ok(Session::new(token, response.user))
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, SessionError> {
        tracing::info!("Registering {}", request.email);
        let response = self
            .api
            .post_raw(REGISTER_PATH, request)
            .await
            .map_err(|e| SessionError::from_api(e, REGISTRATION_FAILED))?;

        if response.is_success() {
            self.storage.set(NEW_USER_KEY, "true");
        }

        if !response.is_json() {
            tracing::error!(
                "Registration returned {} with content type {:?}",
                response.status,
                response.content_type
            );
            return Err(SessionError::Protocol(UNPROCESSABLE_RESPONSE.to_string()));
        }

        if !response.is_success() {
            let message = try_server_message(&response.body)
                .unwrap_or_else(|| REGISTRATION_FAILED.to_string());
            return Err(SessionError::Auth(message));
        }

        response
            .json()
            .map_err(|_| SessionError::Protocol(UNPROCESSABLE_RESPONSE.to_string()))
    }

    /// Fetch the profile and refresh the cached copy.
    ///
    /// A 401 clears the stored token and raises the unauthorized signal.
    pub async fn get_profile(&self) -> Result<Profile, SessionError> {
        let Some(token) = self.token() else {
            return Err(SessionError::Auth(NO_LOCAL_TOKEN.to_string()));
        };
        let ticket = self.current_epoch();

        let api = self.api.authorized(&token);
        let api = &api;
        match with_retry(&self.retry, "profile fetch", move || {
            api.get_json::<Profile>(PROFILE_PATH)
        })
        .await
        {
            Ok(profile) => {
                self.commit_if_current(ticket, || self.store_profile(Some(&profile)))?;
                Ok(profile)
            }
            Err(e) if e.is_unauthorized() => {
                self.commit_if_current(ticket, || self.storage.remove(TOKEN_KEY))?;
                self.raise_unauthorized(PROFILE_PATH);
                Err(SessionError::Auth(SESSION_EXPIRED.to_string()))
            }
            Err(e) => Err(SessionError::from_api(e, PROFILE_FETCH_FAILED)),
        }
    }

    /// Send a partial update and cache the server's copy of the result.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, SessionError> {
        let Some(token) = self.token() else {
            return Err(SessionError::Auth(NO_LOCAL_TOKEN.to_string()));
        };
        let ticket = self.current_epoch();

        match self
            .api
            .authorized(&token)
            .put_json::<_, Profile>(PROFILE_PATH, update)
            .await
        {
            Ok(profile) => {
                self.commit_if_current(ticket, || self.store_profile(Some(&profile)))?;
                Ok(profile)
            }
            Err(e) if e.is_unauthorized() => {
                self.raise_unauthorized(PROFILE_PATH);
                Err(SessionError::Auth(PROFILE_UPDATE_FAILED.to_string()))
            }
            Err(ApiError::Network(detail)) => {
                tracing::error!("Profile update failed: {}", detail);
                Err(SessionError::Network(NETWORK_UNREACHABLE.to_string()))
            }
            Err(e) => {
                tracing::error!("Profile update failed: {}", e);
                Err(SessionError::Auth(PROFILE_UPDATE_FAILED.to_string()))
            }
        }
    }
}
