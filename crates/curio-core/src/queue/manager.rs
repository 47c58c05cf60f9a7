//! Download queue manager.
//!
//! Owns the ordered queue, serializes execution through the transfer
//! executor, verifies integrity before committing metadata, and mirrors
//! every transition into the crash-recovery log. Exactly one item is ever
//! "current"; everything behind it stays inert until its turn.

use crate::audit::AuditLog;
use crate::cancel::CancellationToken;
use crate::config::{DownloadConfig, PathsConfig};
use crate::hashing::{verify_sha256, HashCache};
use crate::library::{apply_retention, RetentionPolicy};
use crate::metadata::{sidecar_paths, SidecarMetadata, SidecarStore};
use crate::organize::classify_base_model;
use crate::queue::item::{NewDownload, QueueItem};
use crate::queue::log::{DownloadLog, DownloadLogEntry, DownloadStatus};
use crate::registry::{ModelVersion, RegistryClient};
use crate::transfer::{TransferExecutor, TransferOutcome, TransferProgress, TransferRequest};
use crate::{CurioError, LibraryGuard};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued(u64),
    /// The URL is already queued; repeated submissions are a no-op.
    Duplicate,
}

/// Terminal outcome of one processed queue item.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub item_id: u64,
    pub filename: String,
    pub status: DownloadStatus,
    /// Human-readable message for failures.
    pub error: Option<String>,
}

/// Behavior switches for the post-transfer commit.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Unpack `.zip` containers after a verified download.
    pub unpack_archives: bool,
    /// Save the first registry preview image next to the artifact.
    pub save_previews: bool,
    /// Write the raw registry response as `.api_info.json`.
    pub save_api_info: bool,
    /// What to do with an existing file before re-downloading it.
    pub retention: RetentionPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            unpack_archives: false,
            save_previews: true,
            save_api_info: true,
            retention: RetentionPolicy::default(),
        }
    }
}

/// The download queue.
pub struct QueueManager {
    items: Mutex<Vec<QueueItem>>,
    next_id: AtomicU64,
    log: DownloadLog,
    registry: Arc<RegistryClient>,
    executor: TransferExecutor,
    /// Shared with the organizer: downloads and moves must not interleave.
    library_guard: LibraryGuard,
    audit: AuditLog,
    hash_cache: Option<Arc<dyn HashCache>>,
    settings: QueueSettings,
    /// true = not transferring. Cancel/cleanup paths wait on this before
    /// touching shared state, so a cancel can never race an active write.
    idle_tx: watch::Sender<bool>,
    idle_rx: watch::Receiver<bool>,
    /// Cancellation token of the in-flight transfer.
    current_cancel: StdMutex<Option<CancellationToken>>,
    /// Non-terminal log entries found at startup: downloads a previous
    /// process life left behind. Cleared by restore or dismiss.
    recovery_list: StdMutex<Vec<DownloadLogEntry>>,
}

impl QueueManager {
    pub fn new(
        data_dir: &Path,
        registry: Arc<RegistryClient>,
        executor: TransferExecutor,
        library_guard: LibraryGuard,
    ) -> Self {
        let (idle_tx, idle_rx) = watch::channel(true);
        let log = DownloadLog::new(data_dir);
        if let Err(e) = log.purge_older_than(DownloadConfig::LOG_RETENTION_DAYS) {
            warn!("Could not purge download log: {}", e);
        }

        // Seed past the surviving log entries so restored items never share
        // an id with the records they are restored from
        let max_logged_id = log.all().iter().map(|e| e.id).max().unwrap_or(0);

        // Whatever the log still reports as non-terminal was interrupted by
        // the previous process life
        let recovery_list = log.interrupted();

        Self {
            items: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(max_logged_id),
            log,
            registry,
            executor,
            library_guard,
            audit: AuditLog::new(data_dir),
            hash_cache: None,
            settings: QueueSettings::default(),
            idle_tx,
            idle_rx,
            current_cancel: StdMutex::new(None),
            recovery_list: StdMutex::new(recovery_list),
        }
    }

    pub fn with_settings(mut self, settings: QueueSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_hash_cache(mut self, cache: Arc<dyn HashCache>) -> Self {
        self.hash_cache = Some(cache);
        self
    }

    /// Add an item to the queue. A URL that is already queued is rejected
    /// silently; this is the guard against repeated front-end submissions.
    pub async fn enqueue(&self, request: NewDownload) -> Enqueue {
        let mut items = self.items.lock().await;

        if items.iter().any(|i| i.url == request.url) {
            debug!("Duplicate enqueue ignored: {}", request.url);
            return Enqueue::Duplicate;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let item = QueueItem::new(id, request);

        if let Err(e) = self.log.record_queued(&item) {
            warn!("Could not log enqueue of {}: {}", item.filename, e);
        }

        info!("Enqueued {} (id {})", item.filename, id);
        items.push(item);
        Enqueue::Queued(id)
    }

    /// Remove a pending item. The active head cannot be dequeued while its
    /// transfer runs; use [`cancel_current`](Self::cancel_current).
    pub async fn dequeue(&self, id: u64) -> bool {
        let mut items = self.items.lock().await;

        let Some(index) = items.iter().position(|i| i.id == id) else {
            return false;
        };
        if index == 0 && !*self.idle_rx.borrow() {
            return false;
        }

        items.remove(index);
        let _ = self.log.set_status(id, DownloadStatus::Cancelled);
        true
    }

    /// Move a pending item to a new position. While a transfer is active,
    /// the head is pinned: it can be neither moved nor displaced.
    pub async fn reorder(&self, id: u64, new_index: usize) -> bool {
        let mut items = self.items.lock().await;
        let transferring = !*self.idle_rx.borrow();

        let Some(index) = items.iter().position(|i| i.id == id) else {
            return false;
        };
        if transferring && index == 0 {
            return false;
        }

        let item = items.remove(index);
        let mut target = new_index.min(items.len());
        if transferring {
            target = target.max(1);
        }
        items.insert(target, item);
        true
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Snapshot of the queued items, in order.
    pub async fn snapshot(&self) -> Vec<QueueItem> {
        self.items.lock().await.clone()
    }

    /// Process the queue head to a terminal outcome. Returns `None` when
    /// the queue is empty.
    pub async fn run_next(
        &self,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Option<DownloadOutcome> {
        let mut item = self.items.lock().await.first().cloned()?;

        let cancel = CancellationToken::new();
        *self.current_cancel.lock().unwrap() = Some(cancel.clone());

        // Lazy metadata fill-in, deferred from enqueue time so batch
        // enqueues stay cheap. A fetch failure degrades to the path the
        // item was enqueued with instead of aborting the download.
        if !item.metadata_fetched {
            self.fill_metadata(&mut item).await;
            let mut items = self.items.lock().await;
            match items.first_mut() {
                Some(head) if head.id == item.id => *head = item.clone(),
                _ => return None, // dequeued meanwhile
            }
        }

        // Restrictions are detected before any bytes are requested
        if let Some(version) = matching_version(&item) {
            if version.is_early_access() {
                info!(
                    "'{}' is marked as early access; not downloading",
                    item.filename
                );
                return Some(
                    self.finish(
                        &item,
                        DownloadStatus::Failed,
                        Some(CurioError::EarlyAccessRestricted {
                            file: item.filename.clone(),
                        }),
                        false,
                    )
                    .await,
                );
            }
        }

        let resolved_url = match self
            .registry
            .resolve_download_url(&item.url, &item.filename)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                return Some(self.finish(&item, DownloadStatus::Failed, Some(e), false).await)
            }
        };

        let dest = item.dest_path();
        if let Err(e) = std::fs::create_dir_all(item.effective_dir()) {
            let err = CurioError::io_with_path(e, item.effective_dir());
            return Some(self.finish(&item, DownloadStatus::Failed, Some(err), false).await);
        }
        if let Err(e) = apply_retention(&dest, self.settings.retention, &self.audit) {
            return Some(self.finish(&item, DownloadStatus::Failed, Some(e), false).await);
        }

        let _ = self.log.set_status(item.id, DownloadStatus::Downloading);
        let _ = self.idle_tx.send(false);
        let library = self.library_guard.lock().await;

        let request = TransferRequest {
            id: item.id,
            url: resolved_url,
            dest_dir: item.effective_dir().clone(),
            filename: item.filename.clone(),
        };
        let outcome = self.executor.transfer(&request, &cancel, progress_tx).await;

        let result = match outcome {
            TransferOutcome::Completed => match self.verify(&item, &dest).await {
                Ok(verified_sha) => {
                    self.commit(&item, &dest, verified_sha).await;
                    self.finish(&item, DownloadStatus::Completed, None, false).await
                }
                Err(e) => self.finish(&item, DownloadStatus::Failed, Some(e), true).await,
            },
            TransferOutcome::Cancelled => {
                self.finish(&item, DownloadStatus::Cancelled, None, true).await
            }
            TransferOutcome::Failed(e) => {
                self.finish(&item, DownloadStatus::Failed, Some(e), true).await
            }
        };

        drop(library);
        let _ = self.idle_tx.send(true);
        *self.current_cancel.lock().unwrap() = None;

        Some(result)
    }

    /// Process items until the queue is empty. One item's failure never
    /// stops the batch; the outcomes are returned as a list.
    pub async fn drain(
        &self,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Vec<DownloadOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next(progress_tx.clone()).await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Cancel the in-flight transfer, waiting (bounded) for the worker to
    /// acknowledge before returning.
    pub async fn cancel_current(&self) {
        let token = self.current_cancel.lock().unwrap().clone();
        if let Some(token) = token {
            token.cancel();
        }
        self.wait_until_idle().await;
    }

    /// Cancel the in-flight transfer and clear the whole queue.
    pub async fn cancel_all(&self) {
        self.cancel_current().await;

        let mut items = self.items.lock().await;
        for item in items.drain(..) {
            let _ = self.log.set_status(item.id, DownloadStatus::Cancelled);
        }
        info!("Download queue cleared");
    }

    /// Downloads interrupted by the previous process life (crash recovery).
    pub fn interrupted_downloads(&self) -> Vec<DownloadLogEntry> {
        self.recovery_list.lock().unwrap().clone()
    }

    /// Dismiss the recovery list without restoring anything.
    pub fn dismiss_interrupted(&self) {
        self.recovery_list.lock().unwrap().clear();
        if let Err(e) = self.log.dismiss_interrupted() {
            warn!("Could not dismiss interrupted downloads: {}", e);
        }
    }

    /// Re-enqueue the interrupted downloads from the log, re-deriving full
    /// items with a fresh registry fetch, then clear the log markers.
    /// Returns how many items were restored.
    pub async fn restore_interrupted(&self) -> usize {
        let interrupted = std::mem::take(&mut *self.recovery_list.lock().unwrap());

        // Clear the old markers first, so the recovery list does not
        // reappear and the re-enqueued items below stay the only
        // non-terminal entries in the log
        if let Err(e) = self.log.dismiss_interrupted() {
            warn!("Could not clear interrupted markers: {}", e);
        }

        let mut restored = 0;

        for entry in interrupted {
            let duplicate = self
                .items
                .lock()
                .await
                .iter()
                .any(|i| i.url == entry.url);
            if duplicate {
                continue;
            }

            let request = NewDownload {
                url: entry.url,
                filename: entry.filename,
                install_dir: entry.install_dir,
                model_id: entry.model_id,
                model_name: entry.model_name,
                version_name: entry.version_name,
                sha256: entry.sha256,
                create_sidecar: entry.create_sidecar,
                from_batch: entry.from_batch,
            };

            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut item = QueueItem::new(id, request);

            // Fresh registry data; an item whose model vanished is skipped
            if let Some(model_id) = item.model_id {
                match self.registry.get_model_raw(model_id).await {
                    Ok(raw) => {
                        item.model_response = serde_json::from_value(raw.clone()).ok();
                        item.model_raw = Some(raw);
                        item.resolved_dir = locate_existing_dir(&item.install_dir, model_id);
                        item.metadata_fetched = true;
                    }
                    Err(e) => {
                        warn!(
                            "Not restoring '{}': registry fetch failed: {}",
                            item.filename, e
                        );
                        continue;
                    }
                }
            }

            if let Err(e) = self.log.record_queued(&item) {
                warn!("Could not log restored item {}: {}", item.filename, e);
            }
            self.items.lock().await.push(item);
            restored += 1;
        }

        info!("Restored {} interrupted downloads", restored);
        restored
    }

    // Internal

    async fn wait_until_idle(&self) {
        let mut rx = self.idle_rx.clone();
        let wait = rx.wait_for(|idle| *idle);
        if tokio::time::timeout(DownloadConfig::CANCEL_WAIT_TIMEOUT, wait)
            .await
            .is_err()
        {
            warn!("Timed out waiting for the active transfer to stop; proceeding with cleanup");
        }
    }

    async fn fill_metadata(&self, item: &mut QueueItem) {
        if let Some(model_id) = item.model_id {
            match self.registry.get_model_raw(model_id).await {
                Ok(raw) => {
                    item.model_response = serde_json::from_value(raw.clone()).ok();
                    item.model_raw = Some(raw);
                    item.resolved_dir = locate_existing_dir(&item.install_dir, model_id);
                }
                Err(e) => {
                    warn!(
                        "Could not load registry data for '{}' ({}); using the enqueue-time path",
                        item.model_name, e
                    );
                }
            }
        }
        item.metadata_fetched = true;
    }

    /// Post-transfer integrity check.
    ///
    /// Only runs when an expected hash was supplied; its absence means
    /// "unverified", not failure. A mismatch is a hard failure: the file
    /// is not trusted and nothing is committed for it.
    async fn verify(&self, item: &QueueItem, dest: &Path) -> Result<Option<String>, CurioError> {
        let Some(expected) = item.expected_sha256.clone() else {
            return Ok(None);
        };

        info!("Verifying integrity of {}", item.filename);
        let path = dest.to_path_buf();
        tokio::task::spawn_blocking(move || verify_sha256(&path, &expected))
            .await
            .map_err(|e| CurioError::Other(format!("Verification task failed: {}", e)))?
            .map(Some)
    }

    /// Commit a verified download: sidecars, optional unpack, previews,
    /// hash cache. Individual commit steps are best-effort; the download
    /// itself already succeeded.
    async fn commit(&self, item: &QueueItem, dest: &Path, verified_sha: Option<String>) {
        let mut unpack_list = Vec::new();

        if self.settings.unpack_archives
            && dest.extension().and_then(|e| e.to_str()) == Some("zip")
        {
            match crate::archive::unpack_zip(dest, item.effective_dir()) {
                Ok(members) => {
                    unpack_list = members;
                    if let Err(e) = std::fs::remove_file(dest) {
                        warn!("Could not remove unpacked archive {}: {}", dest.display(), e);
                    }
                }
                Err(e) => warn!("Could not unpack {}: {}", dest.display(), e),
            }
        }

        if item.create_sidecar {
            let version = matching_version(item);
            let base_model_hint = version
                .and_then(|v| v.base_model.as_deref())
                .map(|raw| classify_base_model(raw, true).unwrap_or_else(|| raw.to_string()));

            let update = SidecarMetadata {
                sha256: verified_sha
                    .clone()
                    .map(|s| s.to_uppercase())
                    .or_else(|| item.expected_sha256.clone()),
                model_id: item.model_id,
                model_version_id: version.map(|v| v.id),
                base_model_hint,
                model_page_url: item.model_id.map(|id| {
                    format!("https://civitai.com/models/{}", id)
                }),
                unpack_list,
                ..Default::default()
            };
            if let Err(e) = SidecarStore::merge(dest, &update) {
                warn!("Could not write sidecar for {}: {}", item.filename, e);
            }
        }

        if self.settings.save_api_info {
            if let Some(raw) = &item.model_raw {
                if let Err(e) = SidecarStore::write_api_info(dest, raw) {
                    warn!("Could not write api_info sidecar for {}: {}", item.filename, e);
                }
            }
        }

        if self.settings.save_previews {
            self.save_preview(item, dest).await;
        }

        // Pre-registering the verified hash lets the host load the model
        // without recomputing it; failure here never fails the download
        if let (Some(cache), Some(sha)) = (&self.hash_cache, &verified_sha) {
            cache.register(dest, sha);
        }
    }

    async fn save_preview(&self, item: &QueueItem, dest: &Path) {
        let Some(image_url) = matching_version(item)
            .and_then(|v| v.images.first())
            .map(|i| i.url.clone())
        else {
            return;
        };

        match self.registry.fetch_image(&image_url).await {
            Ok(bytes) => {
                let preview_path = PathBuf::from(format!(
                    "{}.preview.png",
                    dest.with_extension("").to_string_lossy()
                ));
                if let Err(e) = std::fs::write(&preview_path, bytes) {
                    warn!("Could not save preview for {}: {}", item.filename, e);
                }
            }
            Err(e) => debug!("No preview saved for {}: {}", item.filename, e),
        }
    }

    /// Terminal bookkeeping shared by every outcome: optional cleanup of
    /// partial files, log transition, queue pop.
    async fn finish(
        &self,
        item: &QueueItem,
        status: DownloadStatus,
        error: Option<CurioError>,
        cleanup: bool,
    ) -> DownloadOutcome {
        *self.current_cancel.lock().unwrap() = None;

        if cleanup {
            cleanup_partial(&item.dest_path());
        }

        match status {
            DownloadStatus::Completed => info!("Model saved to {}", item.dest_path().display()),
            DownloadStatus::Cancelled => info!("Cancelled download of '{}'", item.filename),
            _ => {
                if let Some(ref e) = error {
                    info!("Download of '{}' failed: {}", item.filename, e);
                }
            }
        }

        let _ = self.log.set_status(item.id, status);

        let mut items = self.items.lock().await;
        if let Some(index) = items.iter().position(|i| i.id == item.id) {
            items.remove(index);
        }

        DownloadOutcome {
            item_id: item.id,
            filename: item.filename.clone(),
            status,
            error: error.map(|e| e.user_message()),
        }
    }
}

/// The registry version this item downloads, matched by expected hash
/// first, then by version label.
fn matching_version(item: &QueueItem) -> Option<&ModelVersion> {
    let response = item.model_response.as_ref()?;

    if let Some(sha) = &item.expected_sha256 {
        if let Some(version) = response.version_by_hash(sha) {
            return Some(version);
        }
    }
    response
        .model_versions
        .iter()
        .find(|v| v.name == item.version_name)
        .or_else(|| response.model_versions.first())
}

/// Find the directory under `root` where a model is already installed, by
/// looking for a sidecar recording its id.
fn locate_existing_dir(root: &Path, model_id: u64) -> Option<PathBuf> {
    if !root.is_dir() {
        return None;
    }

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.file_name() != PathsConfig::TRASH_DIR_NAME)
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let Ok(Some(doc)) = crate::metadata::atomic_read_json::<Value>(path) else {
            continue;
        };
        if doc.get("modelId").and_then(|v| v.as_u64()) == Some(model_id) {
            return path.parent().map(|p| p.to_path_buf());
        }
    }
    None
}

/// Remove a partially written artifact and the sidecars already created
/// for it, so no orphaned half-installed model remains.
fn cleanup_partial(dest: &Path) {
    for sidecar in sidecar_paths(dest) {
        if let Err(e) = std::fs::remove_file(&sidecar) {
            warn!("Could not remove {}: {}", sidecar.display(), e);
        }
    }

    for suffix in ["", PathsConfig::DAEMON_CONTROL_SUFFIX, PathsConfig::TEMP_SUFFIX] {
        let path = PathBuf::from(format!("{}{}", dest.to_string_lossy(), suffix));
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}
