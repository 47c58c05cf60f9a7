//! Single-transfer executor.
//!
//! Owns the choice between the daemon path and the HTTP fallback, the ~4Hz
//! status polling, cancellation, and the daemon-unreachable recovery loop.

use crate::cancel::CancellationToken;
use crate::config::DaemonConfig;
use crate::daemon::{Aria2Client, DaemonSupervisor, DaemonTransferState};
use crate::network::{FallbackDownloader, HttpClient};
use crate::transfer::progress::TransferProgress;
use crate::{CurioError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The fields of a queue item a transfer needs. The executor never sees,
/// and cannot mutate, the rest of the item.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: u64,
    pub url: String,
    pub dest_dir: PathBuf,
    pub filename: String,
}

impl TransferRequest {
    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }
}

/// Terminal outcome of one transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed,
    /// User cancellation; not an error.
    Cancelled,
    Failed(CurioError),
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferOutcome::Cancelled)
    }
}

/// Drives one download at a time.
pub struct TransferExecutor {
    rpc: Aria2Client,
    supervisor: Arc<DaemonSupervisor>,
    fallback: FallbackDownloader,
    /// Resolved from host settings; daemon transfers use async DNS unless
    /// the user disabled it.
    async_dns: bool,
}

impl TransferExecutor {
    pub fn new(http: Arc<HttpClient>, supervisor: Arc<DaemonSupervisor>) -> Self {
        Self {
            rpc: Aria2Client::new(http.clone()),
            supervisor,
            fallback: FallbackDownloader::new(http),
            async_dns: true,
        }
    }

    pub fn with_async_dns(mut self, async_dns: bool) -> Self {
        self.async_dns = async_dns;
        self
    }

    /// Run one transfer to completion, cancellation, or terminal failure.
    ///
    /// Progress snapshots go into `progress_tx`; the channel is bounded and
    /// sends are best-effort so a slow consumer never stalls the transfer.
    pub async fn transfer(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> TransferOutcome {
        if self.supervisor.available() {
            self.transfer_via_daemon(request, cancel, progress_tx).await
        } else {
            self.transfer_via_fallback(request, cancel, progress_tx).await
        }
    }

    async fn transfer_via_daemon(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> TransferOutcome {
        if let Err(e) = self.supervisor.ensure_started().await {
            warn!("Daemon start failed, using fallback downloader: {}", e);
            return self.transfer_via_fallback(request, cancel, progress_tx).await;
        }

        let dest_dir = request.dest_dir.to_string_lossy().into_owned();
        let mut gid = match self.submit(request, &dest_dir).await {
            Ok(gid) => gid,
            Err(e) => return TransferOutcome::Failed(e),
        };

        let mut rpc_failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                // Remove only this job; the daemon process stays up
                if let Err(e) = self.rpc.remove(&gid).await {
                    warn!("Could not remove daemon job {}: {}", gid, e);
                }
                return TransferOutcome::Cancelled;
            }

            match self.rpc.tell_status(&gid).await {
                Ok(status) => {
                    rpc_failures = 0;

                    if let Some(ref tx) = progress_tx {
                        let total = (status.total_length > 0).then_some(status.total_length);
                        let _ = tx.try_send(TransferProgress::new(
                            status.completed_length,
                            total,
                            status.download_speed as f64,
                        ));
                    }

                    match status.status {
                        DaemonTransferState::Complete => {
                            info!("Transfer {} complete: {}", request.id, request.filename);
                            return TransferOutcome::Completed;
                        }
                        DaemonTransferState::Error => {
                            return TransferOutcome::Failed(CurioError::DownloadFailed {
                                url: request.url.clone(),
                                message: "Transfer daemon reported an error".into(),
                            });
                        }
                        DaemonTransferState::Removed => {
                            return TransferOutcome::Cancelled;
                        }
                        DaemonTransferState::Active
                        | DaemonTransferState::Waiting
                        | DaemonTransferState::Paused => {}
                    }
                }
                Err(e) => {
                    rpc_failures += 1;
                    if rpc_failures >= DaemonConfig::RECONNECT_ATTEMPTS {
                        return TransferOutcome::Failed(CurioError::DaemonUnreachable {
                            attempts: rpc_failures,
                        });
                    }

                    warn!(
                        "Daemon unreachable ({}), restarting and resubmitting (attempt {}/{})",
                        e,
                        rpc_failures,
                        DaemonConfig::RECONNECT_ATTEMPTS
                    );

                    if let Err(e) = self.supervisor.restart().await {
                        warn!("Daemon restart failed: {}", e);
                    }

                    // Resubmit the same job; the daemon resumes from the
                    // control file it left next to the partial download
                    match self.submit(request, &dest_dir).await {
                        Ok(new_gid) => {
                            info!("Daemon reconnected, resumed '{}'", request.filename);
                            gid = new_gid;
                        }
                        Err(e) => warn!("Resubmit after restart failed: {}", e),
                    }
                    tokio::time::sleep(DaemonConfig::RESUBMIT_SETTLE).await;
                }
            }

            tokio::time::sleep(DaemonConfig::POLL_INTERVAL).await;
        }
    }

    async fn submit(&self, request: &TransferRequest, dest_dir: &str) -> Result<String> {
        self.rpc
            .add_uri(&request.url, dest_dir, &request.filename, self.async_dns)
            .await
    }

    async fn transfer_via_fallback(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> TransferOutcome {
        let dest = request.dest_path();
        match self
            .fallback
            .download(&request.url, &dest, cancel, progress_tx)
            .await
        {
            Ok(_) => TransferOutcome::Completed,
            Err(CurioError::Cancelled) => TransferOutcome::Cancelled,
            Err(e) => TransferOutcome::Failed(e),
        }
    }
}
