//! Durable download log for crash recovery.
//!
//! Mirrors each queue item's essential fields plus its status. After a
//! restart, entries stuck in a non-terminal state are surfaced as
//! "interrupted downloads" that the user can restore or dismiss.

use crate::config::PathsConfig;
use crate::metadata::{atomic_read_json, atomic_write_json};
use crate::queue::item::QueueItem;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lifecycle status of a logged download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    /// Terminal entries never come back as interrupted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

/// One persisted download record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    pub id: u64,
    pub url: String,
    pub filename: String,
    pub install_dir: PathBuf,
    #[serde(default)]
    pub model_id: Option<u64>,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub version_name: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub create_sidecar: bool,
    #[serde(default)]
    pub from_batch: bool,
    pub status: DownloadStatus,
    /// RFC3339 timestamp of the last status change.
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LogData {
    entries: Vec<DownloadLogEntry>,
}

/// The on-disk download log.
pub struct DownloadLog {
    path: PathBuf,
}

impl DownloadLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PathsConfig::DOWNLOAD_LOG_FILENAME),
        }
    }

    /// Append an entry for a freshly enqueued item.
    pub fn record_queued(&self, item: &QueueItem) -> Result<()> {
        let mut data = self.load();
        data.entries.push(DownloadLogEntry {
            id: item.id,
            url: item.url.clone(),
            filename: item.filename.clone(),
            install_dir: item.effective_dir().clone(),
            model_id: item.model_id,
            model_name: item.model_name.clone(),
            version_name: item.version_name.clone(),
            sha256: item.expected_sha256.clone(),
            create_sidecar: item.create_sidecar,
            from_batch: item.from_batch,
            status: DownloadStatus::Queued,
            updated_at: now(),
        });
        self.write(&data)
    }

    /// Transition an entry to a new status.
    ///
    /// Marking an entry `Downloading` demotes any other non-terminal
    /// `Downloading` entry to `Failed`; at most one transfer is ever
    /// active, so a second one can only be a leftover from a crash.
    pub fn set_status(&self, id: u64, status: DownloadStatus) -> Result<()> {
        let mut data = self.load();

        if status == DownloadStatus::Downloading {
            for entry in data.entries.iter_mut() {
                if entry.id != id && entry.status == DownloadStatus::Downloading {
                    warn!(
                        "Demoting stale downloading entry {} ({})",
                        entry.id, entry.filename
                    );
                    entry.status = DownloadStatus::Failed;
                    entry.updated_at = now();
                }
            }
        }

        if let Some(entry) = data.entries.iter_mut().find(|e| e.id == id) {
            entry.status = status;
            entry.updated_at = now();
            self.write(&data)?;
        }
        Ok(())
    }

    /// Entries that were neither finished nor cancelled: the recovery list
    /// shown after a restart.
    pub fn interrupted(&self) -> Vec<DownloadLogEntry> {
        self.load()
            .entries
            .into_iter()
            .filter(|e| !e.status.is_terminal())
            .collect()
    }

    /// Clear the interrupted markers so the recovery list does not
    /// reappear. Non-terminal entries become `Cancelled`.
    pub fn dismiss_interrupted(&self) -> Result<()> {
        let mut data = self.load();
        let mut changed = false;
        for entry in data.entries.iter_mut() {
            if !entry.status.is_terminal() {
                entry.status = DownloadStatus::Cancelled;
                entry.updated_at = now();
                changed = true;
            }
        }
        if changed {
            self.write(&data)?;
        }
        Ok(())
    }

    /// Drop terminal entries older than `days`.
    pub fn purge_older_than(&self, days: i64) -> Result<()> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let mut data = self.load();
        let before = data.entries.len();

        data.entries.retain(|entry| {
            if !entry.status.is_terminal() {
                return true;
            }
            match chrono::DateTime::parse_from_rfc3339(&entry.updated_at) {
                Ok(stamp) => stamp.with_timezone(&chrono::Utc) > cutoff,
                // Unparseable timestamps age out too
                Err(_) => false,
            }
        });

        if data.entries.len() < before {
            debug!("Purged {} old log entries", before - data.entries.len());
            self.write(&data)?;
        }
        Ok(())
    }

    pub fn all(&self) -> Vec<DownloadLogEntry> {
        self.load().entries
    }

    /// Read the log, treating a missing or malformed file as empty.
    fn load(&self) -> LogData {
        match atomic_read_json::<LogData>(&self.path) {
            Ok(Some(data)) => data,
            Ok(None) => LogData::default(),
            Err(e) => {
                warn!("Ignoring malformed download log {}: {}", self.path.display(), e);
                LogData::default()
            }
        }
    }

    fn write(&self, data: &LogData) -> Result<()> {
        atomic_write_json(&self.path, data)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
