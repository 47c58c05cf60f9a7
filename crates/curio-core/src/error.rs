//! Error types for the Curio engine.
//!
//! Every terminal outcome the engine can surface maps to a variant here, so
//! front ends can render a specific message instead of a generic failure.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Curio operations.
#[derive(Debug, Error)]
pub enum CurioError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("DNS resolution failed for {host}")]
    DnsFailure { host: String },

    #[error("Registry servers are offline")]
    RegistryOffline,

    #[error("Not found on the registry: {what}")]
    NotFound { what: String },

    // Registry access restrictions
    #[error("An API key is required to download {file}")]
    AuthRequired { file: String },

    #[error("{file} is restricted to early access")]
    EarlyAccessRestricted { file: String },

    // Transfer errors
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Transfer daemon unreachable after {attempts} attempts")]
    DaemonUnreachable { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    // Integrity errors
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Target already exists: {0}")]
    TargetExists(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Organization errors
    #[error("Backup write failed: {message}")]
    BackupFailed { message: String },

    #[error("No backup available to roll back")]
    NoBackup,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Curio operations.
pub type Result<T> = std::result::Result<T, CurioError>;

// Conversion implementations for common error types

impl From<std::io::Error> for CurioError {
    fn from(err: std::io::Error) -> Self {
        CurioError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CurioError {
    fn from(err: serde_json::Error) -> Self {
        CurioError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for CurioError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CurioError::Timeout(std::time::Duration::from_secs(0))
        } else if err.is_connect() {
            // reqwest folds DNS failures into connect errors; keep the host
            // so the message stays actionable.
            let host = err
                .url()
                .and_then(|u| u.host_str())
                .unwrap_or("unknown")
                .to_string();
            let text = err.to_string();
            if text.contains("dns error") || text.contains("failed to lookup") {
                CurioError::DnsFailure { host }
            } else {
                CurioError::Network {
                    message: text.clone(),
                    cause: Some(text),
                }
            }
        } else {
            CurioError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl CurioError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CurioError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CurioError::Network { .. }
                | CurioError::Timeout(_)
                | CurioError::DnsFailure { .. }
        )
    }

    /// Whether the failure was caused by the user cancelling the operation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CurioError::Cancelled)
    }

    /// Human-readable message for terminal outcomes.
    ///
    /// Front ends render this directly, so each restriction/failure class
    /// gets wording that tells the user what to actually do about it.
    pub fn user_message(&self) -> String {
        match self {
            CurioError::NotFound { what } => {
                format!("'{}' was not found on the registry servers; the file may no longer be available for download.", what)
            }
            CurioError::AuthRequired { file } => {
                format!("'{}' requires a personal registry API key to download. Set your key in the settings.", file)
            }
            CurioError::EarlyAccessRestricted { file } => {
                format!("'{}' is marked as early access. You need to purchase this model before it can be downloaded.", file)
            }
            CurioError::HashMismatch { .. } => {
                "Integrity check failed: the downloaded file may be corrupted and was discarded.".to_string()
            }
            CurioError::RegistryOffline => {
                "The registry servers are currently offline. Please try again later.".to_string()
            }
            CurioError::Timeout(_) => {
                "The registry did not respond in time. The servers might be too busy or down if the issue persists.".to_string()
            }
            CurioError::DnsFailure { .. } => {
                "Temporary DNS resolution failure while contacting the registry. Check your network/DNS and try again in a few seconds.".to_string()
            }
            CurioError::DaemonUnreachable { .. } => {
                "The transfer daemon could not be reached and did not come back after a restart.".to_string()
            }
            CurioError::Cancelled => "Download cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CurioError::HashMismatch {
            expected: "abc".into(),
            actual: "def".into(),
        };
        assert_eq!(err.to_string(), "Hash mismatch: expected abc, got def");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CurioError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(CurioError::DnsFailure { host: "x".into() }.is_retryable());
        assert!(!CurioError::NotFound { what: "model".into() }.is_retryable());
        assert!(!CurioError::Cancelled.is_retryable());
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let auth = CurioError::AuthRequired { file: "m.safetensors".into() };
        let early = CurioError::EarlyAccessRestricted { file: "m.safetensors".into() };
        let missing = CurioError::NotFound { what: "m.safetensors".into() };
        assert_ne!(auth.user_message(), early.user_message());
        assert_ne!(auth.user_message(), missing.user_message());
        assert!(auth.user_message().contains("API key"));
        assert!(early.user_message().contains("early access"));
    }
}
