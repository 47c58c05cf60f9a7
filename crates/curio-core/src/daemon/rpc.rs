//! JSON-RPC client for the aria2 transfer daemon.
//!
//! Methods used: `aria2.addUri`, `aria2.tellStatus`, `aria2.remove`. All
//! calls carry the shared `token:<secret>` as their first parameter.

use crate::config::DaemonConfig;
use crate::network::HttpClient;
use crate::{CurioError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// aria2 reports numeric fields as decimal strings.
fn de_u64_str<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Lifecycle state of a daemon-managed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonTransferState {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
}

/// Snapshot of a daemon-managed transfer, from `aria2.tellStatus`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonTransferStatus {
    #[serde(deserialize_with = "de_u64_str")]
    pub total_length: u64,
    #[serde(deserialize_with = "de_u64_str")]
    pub completed_length: u64,
    #[serde(deserialize_with = "de_u64_str")]
    pub download_speed: u64,
    pub status: DaemonTransferState,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// RPC client bound to one daemon endpoint.
pub struct Aria2Client {
    http: Arc<HttpClient>,
    endpoint: String,
    secret: String,
}

impl Aria2Client {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_endpoint(http, DaemonConfig::RPC_PORT, DaemonConfig::RPC_SECRET)
    }

    pub fn with_endpoint(http: Arc<HttpClient>, port: u16, secret: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: format!("http://localhost:{}/jsonrpc", port),
            secret: secret.into(),
        }
    }

    /// Submit a download job; returns the daemon's job id (gid).
    pub async fn add_uri(
        &self,
        url: &str,
        dest_dir: &str,
        filename: &str,
        async_dns: bool,
    ) -> Result<String> {
        let options = json!({
            "dir": dest_dir,
            "out": filename,
            "split": DaemonConfig::CONNECTION_SPLIT.to_string(),
            "max-connection-per-server": DaemonConfig::CONNECTION_SPLIT.to_string(),
            "async-dns": if async_dns { "true" } else { "false" },
        });

        let result = self
            .call("aria2.addUri", json!([[url], options]))
            .await?;

        let gid = result
            .as_str()
            .ok_or_else(|| CurioError::Other("Daemon returned a non-string job id".into()))?;
        debug!("Daemon accepted job {} for {}", gid, filename);
        Ok(gid.to_string())
    }

    /// Query the status of a job.
    pub async fn tell_status(&self, gid: &str) -> Result<DaemonTransferStatus> {
        let result = self.call("aria2.tellStatus", json!([gid])).await?;
        serde_json::from_value(result).map_err(|e| CurioError::Json {
            message: format!("Unexpected daemon status shape: {}", e),
            source: Some(e),
        })
    }

    /// Remove a job (cancellation). Removing an already-finished job is not
    /// an error worth surfacing.
    pub async fn remove(&self, gid: &str) -> Result<()> {
        let _ = self.call("aria2.remove", json!([gid])).await?;
        Ok(())
    }

    async fn call(&self, method: &str, mut params: Value) -> Result<Value> {
        // token must be the first positional parameter
        let token = Value::String(format!("token:{}", self.secret));
        if let Value::Array(ref mut list) = params {
            list.insert(0, token);
        }

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: "1",
            method,
            params,
        };

        let response = self.http.post_json_local(&self.endpoint, &request).await?;
        let parsed: RpcResponse = response.json().await.map_err(CurioError::from)?;

        match (parsed.result, parsed.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(CurioError::Other(format!(
                "Daemon rejected {}: {}",
                method, error
            ))),
            (None, None) => Err(CurioError::Other(format!(
                "Daemon returned neither result nor error for {}",
                method
            ))),
        }
    }
}
