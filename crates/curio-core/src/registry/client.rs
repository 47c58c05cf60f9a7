//! Registry API client.
//!
//! Thin typed wrapper over the registry's HTTP endpoints. Transient
//! failures (timeout, DNS) are retried with backoff; everything else maps
//! to a typed outcome the caller can render directly.

use crate::config::RegistryConfig;
use crate::network::{retry_async, HttpClient, RetryConfig};
use crate::registry::lookup::VersionLookup;
use crate::registry::types::{ModelResponse, VersionByHashResponse};
use crate::{CurioError, Result};
use async_trait::async_trait;
use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Client for model/version lookups and download-URL resolution.
pub struct RegistryClient {
    http: Arc<HttpClient>,
    base_url: String,
}

impl RegistryClient {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_base_url(http, RegistryConfig::BASE_URL)
    }

    pub fn with_base_url(http: Arc<HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch a model by registry id.
    pub async fn get_model(&self, model_id: u64) -> Result<ModelResponse> {
        let url = format!("{}/models/{}", self.base_url, model_id);
        self.get_json(&url, &format!("model {}", model_id)).await
    }

    /// Fetch the raw JSON for a model, for `.api_info.json` sidecars.
    pub async fn get_model_raw(&self, model_id: u64) -> Result<serde_json::Value> {
        let url = format!("{}/models/{}", self.base_url, model_id);
        self.get_json(&url, &format!("model {}", model_id)).await
    }

    /// Resolve the real file URL behind a registry download link.
    ///
    /// The registry answers download links with a redirect: to the file host
    /// when access is granted, or to a login page when an API key is
    /// required. This is detected here, before any bytes are requested, so
    /// an auth problem becomes an actionable message instead of a retry
    /// loop.
    pub async fn resolve_download_url(&self, url: &str, filename: &str) -> Result<String> {
        let response = self.http.get_no_redirect(url).await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");

            if location.contains("login?returnUrl") && location.contains("reason=download-auth") {
                return Err(CurioError::AuthRequired {
                    file: filename.to_string(),
                });
            }
            if location.is_empty() {
                return Err(CurioError::NotFound {
                    what: filename.to_string(),
                });
            }
            return Ok(location.to_string());
        }

        if status.is_success() {
            // Some mirrors serve the file directly without a redirect
            return Ok(url.to_string());
        }

        Err(CurioError::NotFound {
            what: filename.to_string(),
        })
    }

    /// Fetch raw image bytes (preview assets).
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).await?;
        if !response.status().is_success() {
            return Err(CurioError::NotFound {
                what: url.to_string(),
            });
        }
        Ok(response.bytes().await.map_err(CurioError::from)?.to_vec())
    }

    // Internal

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let retry_config = RetryConfig::new()
            .with_max_attempts(RegistryConfig::MAX_RETRIES)
            .with_base_delay(RegistryConfig::RETRY_BASE_DELAY);

        let (result, stats) = retry_async(
            &retry_config,
            || self.get_json_once(url, what),
            |e: &CurioError| e.is_retryable(),
        )
        .await;

        if stats.attempts > 1 {
            debug!("Registry request for {} took {} attempts", what, stats.attempts);
        }

        result
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self.http.get(url).await?;
        let response = Self::check_status(response, what)?;

        let text = response.text().await.map_err(CurioError::from)?;
        if text.trim().is_empty() {
            warn!("Registry returned empty response for {}", url);
            return Err(CurioError::Network {
                message: format!("Empty registry response for {}", what),
                cause: None,
            });
        }

        // A 200 with a non-JSON body is the registry's maintenance page
        serde_json::from_str(&text).map_err(|e| {
            warn!("Registry returned malformed JSON for {}: {}", url, e);
            CurioError::RegistryOffline
        })
    }

    fn check_status(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(CurioError::NotFound {
                what: what.to_string(),
            }),
            StatusCode::SERVICE_UNAVAILABLE => Err(CurioError::RegistryOffline),
            s if HttpClient::is_retryable_status(s) => Err(CurioError::Network {
                message: format!("Registry answered {} for {}", s, what),
                cause: None,
            }),
            s => Err(CurioError::Network {
                message: format!("Registry answered {} for {}", s, what),
                cause: Some("non-retryable status".to_string()),
            }),
        }
    }
}

#[async_trait]
impl VersionLookup for RegistryClient {
    async fn version_by_hash(&self, sha256: &str) -> Result<VersionByHashResponse> {
        let url = format!("{}/model-versions/by-hash/{}", self.base_url, sha256);
        self.get_json(&url, &format!("version by hash {}", &sha256[..sha256.len().min(12)]))
            .await
    }
}
