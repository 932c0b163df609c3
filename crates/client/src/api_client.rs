//! HTTP API client with bearer token support.

use std::time::Duration;

use cribz_shared::ApiError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A response whose status has not been checked yet.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.body.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&self.body).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// Turn a non-2xx response into an error, otherwise decode the body.
    fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        if !self.is_success() {
            return Err(ApiError::Http {
                status: self.status,
                body: self.body,
            });
        }
        self.json()
    }
}

/// HTTP client for the CribzConnect REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// A copy of this client that sends `Authorization: Bearer <token>`.
    pub fn authorized(&self, token: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.to_string()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    async fn execute(&self, rb: RequestBuilder) -> Result<RawResponse, ApiError> {
        let mut rb = rb.header("Accept", "application/json");
        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }

        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    fn json_body<TReq: Serialize>(rb: RequestBuilder, body: &TReq) -> Result<RequestBuilder, ApiError> {
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        Ok(rb
            .body(body_bytes)
            .header("Content-Type", "application/json"))
    }

    /// GET without checking the status.
    pub async fn get_raw(&self, path: &str) -> Result<RawResponse, ApiError> {
        self.execute(self.client.get(self.url(path))).await
    }

    /// POST a JSON body without checking the status.
    pub async fn post_raw<TReq: Serialize>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<RawResponse, ApiError> {
        let rb = Self::json_body(self.client.post(self.url(path)), body)?;
        self.execute(rb).await
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.get_raw(path).await?.into_json()
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.post_raw(path, body).await?.into_json()
    }

    /// Make a PUT request with JSON body
    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let rb = Self::json_body(self.client.put(self.url(path)), body)?;
        self.execute(rb).await?.into_json()
    }
}
