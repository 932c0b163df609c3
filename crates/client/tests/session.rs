//! Session manager against a mocked REST backend.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use cribz_client::api_client::ApiClient;
use cribz_client::error::*;
use cribz_client::session::{SessionManager, NEW_USER_KEY, TOKEN_KEY, USER_DATA_KEY};
use cribz_client::storage::{MemoryStorage, Storage};
use cribz_shared::{Credentials, ProfileUpdate, RegisterRequest};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager(server: &MockServer) -> (Arc<SessionManager>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let api = ApiClient::new(server.uri(), Duration::from_secs(2));
    let manager = Arc::new(SessionManager::new(api, storage.clone(), fast_retry()));
    (manager, storage)
}

fn credentials() -> Credentials {
    Credentials::new("ada@cribz.test", "hunter22")
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "token": TEST_TOKEN,
        "user": profile_json("u1", "Ada Obi")
    }))
}

async fn login_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/api/auth/login")
        .count()
}

// ==================== Login ====================

#[tokio::test]
async fn login_persists_token_and_profile() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"email": "ada@cribz.test", "password": "hunter22"})))
        .respond_with(login_ok())
        .expect(1)
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let session = manager.login(&credentials()).await.unwrap();

    assert_eq!(session.token, TEST_TOKEN);
    assert!(session.expires_at.is_some());
    assert_eq!(storage.get(TOKEN_KEY).as_deref(), Some(TEST_TOKEN));
    assert!(manager.is_authenticated());
    assert_eq!(manager.cached_profile().unwrap().full_name, "Ada Obi");
}

#[tokio::test]
async fn login_401_is_sent_exactly_once() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let err = manager.login(&credentials()).await.unwrap_err();

    assert_eq!(err, SessionError::Auth("Invalid credentials".into()));
    assert_eq!(storage.get(TOKEN_KEY), None);
}

#[tokio::test]
async fn login_401_without_message_uses_fallback() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    let err = manager.login(&credentials()).await.unwrap_err();
    assert_eq!(err, SessionError::Auth(INVALID_CREDENTIALS.into()));
}

#[tokio::test]
async fn login_recovers_after_two_server_errors() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(login_ok())
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    let session = manager.login(&credentials()).await.unwrap();

    assert_eq!(session.token, TEST_TOKEN);
    assert_eq!(login_requests(&server).await, 3);
}

#[tokio::test]
async fn login_gives_up_after_three_retries_with_backoff() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "db down"})))
        .expect(4)
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    let started = Instant::now();
    let err = manager.login(&credentials()).await.unwrap_err();

    // 20ms + 40ms + 80ms between the four attempts
    assert!(started.elapsed() >= Duration::from_millis(140));
    assert_eq!(err, SessionError::Auth("db down".into()));
}

#[tokio::test]
async fn unreachable_backend_fails_fast_on_health() {
    // Nothing listens on the discard port
    let storage = Arc::new(MemoryStorage::new());
    let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(500));
    let manager = SessionManager::new(api, storage, fast_retry());

    let err = manager.login(&credentials()).await.unwrap_err();
    assert_eq!(err, SessionError::Auth(SERVER_UNAVAILABLE.into()));
}

#[tokio::test]
async fn unhealthy_status_blocks_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "DEGRADED"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(login_ok())
        .expect(0)
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    assert!(!manager.check_server_health().await);
    let err = manager.login(&credentials()).await.unwrap_err();
    assert_eq!(err, SessionError::Auth(SERVER_UNAVAILABLE.into()));
}

#[tokio::test]
async fn timeouts_surface_as_one_network_error() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(login_ok().set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryStorage::new());
    let api = ApiClient::new(server.uri(), Duration::from_millis(100));
    let manager = SessionManager::new(api, storage.clone(), fast_retry());

    let err = manager.login(&credentials()).await.unwrap_err();
    assert_eq!(err, SessionError::Network(NETWORK_UNREACHABLE.into()));
    assert_eq!(login_requests(&server).await, 4);
    assert_eq!(storage.get(TOKEN_KEY), None);
}

#[tokio::test]
async fn missing_token_is_a_protocol_error_and_not_retried() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "undefined"})))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let err = manager.login(&credentials()).await.unwrap_err();

    assert_eq!(err, SessionError::Protocol(MISSING_TOKEN.into()));
    assert_eq!(storage.get(TOKEN_KEY), None);
}

#[tokio::test]
async fn logout_during_login_discards_the_response() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(login_ok().set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let in_flight = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login(&credentials()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.logout();

    let result = in_flight.await.unwrap();
    assert_eq!(result.unwrap_err(), SessionError::Superseded);
    assert_eq!(storage.get(TOKEN_KEY), None);
    assert_eq!(storage.get(USER_DATA_KEY), None);
}

/// Storage that refuses every write, like a full or locked-down store.
struct ReadOnlyStorage;

impl Storage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> bool {
        false
    }

    fn remove(&self, _key: &str) {}
}

#[tokio::test]
async fn login_fails_when_session_cannot_be_saved() {
    let server = MockServer::start().await;
    mount_health(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(login_ok())
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri(), Duration::from_secs(2));
    let manager = SessionManager::new(api, Arc::new(ReadOnlyStorage), fast_retry());
    let err = manager.login(&credentials()).await.unwrap_err();

    assert_eq!(err, SessionError::Protocol(SESSION_NOT_SAVED.into()));
    assert!(!manager.is_authenticated());
    assert_eq!(manager.cached_profile(), None);
}

// ==================== Registration ====================

#[tokio::test]
async fn register_sets_new_user_marker_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_json(json!({
            "fullName": "Ada Obi",
            "email": "ada@cribz.test",
            "password": "hunter22"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"message": "Account created"})),
        )
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let response = manager
        .register(&RegisterRequest {
            full_name: "Ada Obi".into(),
            email: "ada@cribz.test".into(),
            password: "hunter22".into(),
        })
        .await
        .unwrap();

    assert_eq!(response.message.as_deref(), Some("Account created"));
    assert_eq!(storage.get(NEW_USER_KEY).as_deref(), Some("true"));
    assert!(manager.take_new_user_marker());
    assert!(!manager.take_new_user_marker());
}

#[tokio::test]
async fn register_html_response_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(502).set_body_raw("<html>Bad Gateway</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let err = manager
        .register(&RegisterRequest {
            full_name: "Ada".into(),
            email: "ada@cribz.test".into(),
            password: "pw".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::Protocol(UNPROCESSABLE_RESPONSE.into()));
    assert_eq!(storage.get(NEW_USER_KEY), None);
}

#[tokio::test]
async fn register_rejection_carries_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"error": "Email already in use"})),
        )
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    let err = manager
        .register(&RegisterRequest {
            full_name: "Ada".into(),
            email: "ada@cribz.test".into(),
            password: "pw".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::Auth("Email already in use".into()));
}

// ==================== Profile ====================

#[tokio::test]
async fn profile_fetch_sends_bearer_and_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json("u1", "Ada Obi")))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    manager.set_token(TEST_TOKEN);
    let profile = manager.get_profile().await.unwrap();

    assert_eq!(profile.id, "u1");
    assert_eq!(manager.cached_profile(), Some(profile));
}

#[tokio::test]
async fn profile_401_clears_token_and_raises_signal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, storage) = manager(&server);
    let mut signals = manager.subscribe_unauthorized();
    manager.set_token(TEST_TOKEN);

    let err = manager.get_profile().await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(storage.get(TOKEN_KEY), None);

    let signal = signals.try_recv().unwrap();
    assert!(signal.url.ends_with("/api/profile"));
}

#[tokio::test]
async fn profile_update_keeps_the_server_normalised_copy() {
    let server = MockServer::start().await;
    let mut updated = profile_json("u1", "Ada Obi");
    updated["phone"] = json!("+2348012345678");
    Mock::given(method("PUT"))
        .and(path("/api/profile"))
        .and(body_json(json!({"phone": "0801 234 5678"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    manager.set_token(TEST_TOKEN);
    let profile = manager
        .update_profile(&ProfileUpdate::phone("0801 234 5678"))
        .await
        .unwrap();

    // The server's formatting wins over what was sent
    assert_eq!(profile.phone.as_deref(), Some("+2348012345678"));
    assert_eq!(manager.cached_profile(), Some(profile.clone()));

    let fetched = manager.get_profile().await.unwrap();
    assert_eq!(fetched.phone.as_deref(), Some("+2348012345678"));
    assert_eq!(fetched, profile);
}

#[tokio::test]
async fn profile_update_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, _) = manager(&server);
    let mut signals = manager.subscribe_unauthorized();
    manager.set_token(TEST_TOKEN);

    let err = manager
        .update_profile(&ProfileUpdate::phone("+234"))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::Auth(PROFILE_UPDATE_FAILED.into()));
    assert!(signals.try_recv().is_err());
}
