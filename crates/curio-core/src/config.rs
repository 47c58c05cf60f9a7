//! Centralized configuration for the Curio engine.
//!
//! Constant blocks for registry access, the transfer daemon, download
//! behavior, organization, and on-disk layout.

use std::time::Duration;

/// Remote registry configuration.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const BASE_URL: &'static str = "https://civitai.com/api/v1";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const USER_AGENT: &'static str = "Curio-Library/1.0";
}

/// Transfer daemon (aria2 RPC) configuration.
pub struct DaemonConfig;

impl DaemonConfig {
    pub const RPC_PORT: u16 = 24000;
    pub const RPC_SECRET: &'static str = "R7T5P2Q9K6";
    /// Status poll cadence while a transfer is active (~4Hz).
    pub const POLL_INTERVAL: Duration = Duration::from_millis(250);
    /// Connections per server / split count handed to the daemon.
    pub const CONNECTION_SPLIT: u32 = 64;
    /// RPC failures tolerated (with restart + resubmit) before giving up.
    pub const RECONNECT_ATTEMPTS: u32 = 5;
    /// Settle time after (re)starting the daemon process.
    pub const RESTART_SETTLE: Duration = Duration::from_secs(3);
    /// Extra delay after resubmitting a job to a restarted daemon.
    pub const RESUBMIT_SETTLE: Duration = Duration::from_secs(2);
}

/// Download behavior configuration.
pub struct DownloadConfig;

impl DownloadConfig {
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
    /// Fallback downloader: transient request failures tolerated per file.
    pub const FALLBACK_MAX_RETRIES: u32 = 5;
    /// Fixed delay between fallback retries.
    pub const FALLBACK_RETRY_DELAY: Duration = Duration::from_secs(5);
    /// How long cancel/cleanup paths wait for the active transfer to yield
    /// before proceeding anyway.
    pub const CANCEL_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Hashing block size for integrity verification.
    pub const HASH_BLOCK_SIZE: usize = 8 * 1024 * 1024;
    /// Terminal log entries older than this are purged on startup.
    pub const LOG_RETENTION_DAYS: i64 = 7;
}

/// Organization and backup configuration.
pub struct OrganizeConfig;

impl OrganizeConfig {
    /// Number of backup records kept in the ring.
    pub const MAX_BACKUPS: usize = 5;
    /// Numbered preview images checked per artifact (`_0` .. `_19`).
    pub const PREVIEW_INDEX_LIMIT: u32 = 20;
}

/// On-disk names shared across the engine.
pub struct PathsConfig;

impl PathsConfig {
    pub const DOWNLOAD_LOG_FILENAME: &'static str = "download_log.json";
    pub const BACKUP_FILENAME: &'static str = "organization_backups.json";
    pub const AUDIT_LOG_FILENAME: &'static str = "update_audit.jsonl";
    pub const HASH_CACHE_FILENAME: &'static str = "hash_cache.json";
    pub const TRASH_DIR_NAME: &'static str = "_Trash";
    pub const TEMP_SUFFIX: &'static str = ".part";
    /// Control files the daemon leaves next to unfinished transfers.
    pub const DAEMON_CONTROL_SUFFIX: &'static str = ".aria2";
    /// Artifact extensions recognized during library scans.
    pub const ARTIFACT_EXTENSIONS: &'static [&'static str] =
        &["safetensors", "ckpt", "pt", "pth", "bin", "onnx", "gguf", "zip"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(RegistryConfig::REQUEST_TIMEOUT > Duration::ZERO);
        assert!(DaemonConfig::POLL_INTERVAL < Duration::from_secs(1));
        assert!(DownloadConfig::CANCEL_WAIT_TIMEOUT >= Duration::from_secs(60));
    }

    #[test]
    fn test_artifact_extensions_are_lowercase() {
        for ext in PathsConfig::ARTIFACT_EXTENSIONS {
            assert_eq!(*ext, ext.to_lowercase());
        }
    }
}
