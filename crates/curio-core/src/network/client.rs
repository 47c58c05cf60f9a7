//! HTTP client wrapper for registry and download traffic.
//!
//! Wraps reqwest with configured timeouts, a user agent, and an optional
//! opaque bearer token that is attached to every request.

use crate::config::RegistryConfig;
use crate::{CurioError, Result};
use reqwest::{Client, Response, StatusCode};
use std::sync::RwLock;
use std::time::Duration;

/// HTTP client with bearer-token support.
pub struct HttpClient {
    client: Client,
    /// Opaque API token; attached as `Authorization: Bearer <token>`.
    api_token: RwLock<Option<String>>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(RegistryConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(RegistryConfig::CONNECT_TIMEOUT)
            .user_agent(RegistryConfig::USER_AGENT)
            .build()
            .map_err(|e| CurioError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self {
            client,
            api_token: RwLock::new(None),
        })
    }

    /// Set or clear the bearer token used for authenticated requests.
    pub fn set_api_token(&self, token: Option<String>) {
        *self.api_token.write().unwrap() = token.filter(|t| !t.is_empty());
    }

    /// Whether a bearer token is currently configured.
    pub fn has_api_token(&self) -> bool {
        self.api_token.read().unwrap().is_some()
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Make an authenticated GET request.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(token) = self.api_token.read().unwrap().clone() {
            request = request.bearer_auth(token);
        }

        request.send().await.map_err(CurioError::from)
    }

    /// GET without following redirects, used to inspect download gateways.
    ///
    /// Registry download URLs answer with a redirect to the actual file
    /// host; an auth-gated file answers with a redirect to a login page
    /// instead, which the caller must detect before any bytes move.
    pub async fn get_no_redirect(&self, url: &str) -> Result<Response> {
        let client = Client::builder()
            .timeout(RegistryConfig::REQUEST_TIMEOUT)
            .user_agent(RegistryConfig::USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CurioError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        let mut request = client.get(url);
        if let Some(token) = self.api_token.read().unwrap().clone() {
            request = request.bearer_auth(token);
        }

        request.send().await.map_err(CurioError::from)
    }

    /// POST a JSON body without authentication (local daemon RPC).
    pub async fn post_json_local<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response> {
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(CurioError::from)
    }

    /// Check if an HTTP status code indicates a retryable error.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 504)
    }

    /// Check if an HTTP status code means the registry is down.
    pub fn is_offline_status(status: StatusCode) -> bool {
        status == StatusCode::SERVICE_UNAVAILABLE
    }
}
