//! Resumable single-connection HTTP downloader.
//!
//! Fallback path used when the transfer daemon is unavailable on the host
//! platform. Supports resuming from the byte offset of a partially written
//! file via `Range` requests, retries transient failures a fixed number of
//! times, and reports progress from bytes actually written.

use crate::cancel::CancellationToken;
use crate::config::DownloadConfig;
use crate::network::client::HttpClient;
use crate::transfer::progress::{SpeedTracker, TransferProgress};
use crate::{CurioError, Result};
use futures::StreamExt;
use reqwest::{header, StatusCode};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Single-connection downloader with range resume.
pub struct FallbackDownloader {
    http: Arc<HttpClient>,
}

impl FallbackDownloader {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Download `url` to `destination`, resuming a partial file if present.
    ///
    /// Transient request failures are retried up to
    /// [`DownloadConfig::FALLBACK_MAX_RETRIES`] times with a fixed delay;
    /// each retry resumes from the bytes already on disk. Cancellation is
    /// observed at every chunk boundary. Returns total bytes on disk.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CurioError::io_with_path(e, parent))?;
            }
        }

        let mut retries_left = DownloadConfig::FALLBACK_MAX_RETRIES;

        loop {
            cancel.check()?;

            match self.try_download(url, destination, cancel, progress_tx.clone()).await {
                Ok(bytes) => {
                    info!("Downloaded {} bytes to {}", bytes, destination.display());
                    return Ok(bytes);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) if e.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!(
                        "Transient download failure ({}), resuming ({} retries left)",
                        e, retries_left
                    );
                    tokio::time::sleep(DownloadConfig::FALLBACK_RETRY_DELAY).await;
                }
                Err(e) => {
                    // Terminal: no orphaned partial file is left behind
                    let _ = std::fs::remove_file(destination);
                    return Err(e);
                }
            }
        }
    }

    /// One download attempt, resuming from whatever is already on disk.
    async fn try_download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<u64> {
        let resume_offset = std::fs::metadata(destination).map(|m| m.len()).unwrap_or(0);

        let mut request = self.http.inner().get(url);
        if resume_offset > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", resume_offset));
        }

        let response = request.send().await.map_err(CurioError::from)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CurioError::NotFound {
                what: url.to_string(),
            });
        }
        if !status.is_success() {
            let message = format!("Download failed with status {}", status);
            if HttpClient::is_retryable_status(status) {
                return Err(CurioError::Network {
                    message,
                    cause: None,
                });
            }
            return Err(CurioError::DownloadFailed {
                url: url.to_string(),
                message,
            });
        }

        // With a Range request the Content-Length is the remainder only
        let total_bytes = response.content_length().map(|len| len + resume_offset);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)
            .map_err(|e| CurioError::io_with_path(e, destination))?;

        let mut bytes_on_disk = resume_offset;
        let mut speed_tracker = SpeedTracker::new();
        let mut last_update = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            cancel.check()?;

            let chunk = chunk_result.map_err(|e| CurioError::Network {
                message: format!("Error reading download stream: {}", e),
                cause: Some(e.to_string()),
            })?;

            file.write_all(&chunk)
                .map_err(|e| CurioError::io_with_path(e, destination))?;

            bytes_on_disk += chunk.len() as u64;
            speed_tracker.record(chunk.len() as u64);

            if last_update.elapsed() >= DownloadConfig::PROGRESS_INTERVAL {
                if let Some(ref tx) = progress_tx {
                    let _ = tx
                        .send(TransferProgress::new(
                            bytes_on_disk,
                            total_bytes,
                            speed_tracker.speed(),
                        ))
                        .await;
                }
                last_update = Instant::now();
            }
        }

        file.flush()
            .map_err(|e| CurioError::io_with_path(e, destination))?;

        // A short read (connection dropped mid-body) must resume, not succeed
        if let Some(total) = total_bytes {
            if bytes_on_disk < total {
                return Err(CurioError::Network {
                    message: format!(
                        "Connection closed early: {} of {} bytes",
                        bytes_on_disk, total
                    ),
                    cause: None,
                });
            }
        }

        if let Some(ref tx) = progress_tx {
            let _ = tx
                .send(TransferProgress::new(
                    bytes_on_disk,
                    total_bytes,
                    speed_tracker.speed(),
                ))
                .await;
        }

        Ok(bytes_on_disk)
    }
}
