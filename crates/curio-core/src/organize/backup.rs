//! Backup records for organization runs.
//!
//! A backup capturing every planned move is durably written before the
//! first file is touched; it is the only state that makes rollback
//! possible. The store keeps a ring of the most recent records.

use crate::config::{OrganizeConfig, PathsConfig};
use crate::metadata::{atomic_read_json, atomic_write_json};
use crate::organize::planner::{LabelSummary, OrganizationMove};
use crate::{CurioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Aggregate numbers of one organization run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupStats {
    pub total_files: usize,
    pub total_size: u64,
    pub total_folders: usize,
    pub folders: Vec<String>,
}

/// Snapshot of one organization run, sufficient for exact rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Sortable id, `YYYY-MM-DD_HH-MM-SS`.
    pub timestamp: String,
    pub date_readable: String,
    pub moves: Vec<OrganizationMove>,
    pub summary: BTreeMap<String, LabelSummary>,
    pub stats: BackupStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct BackupFileData {
    backups: Vec<BackupRecord>,
}

/// Ring store of the last N backup records.
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PathsConfig::BACKUP_FILENAME),
        }
    }

    /// Persist a new backup record. Fails loudly: execution must not
    /// proceed when the backup could not be written.
    pub fn save(
        &self,
        moves: Vec<OrganizationMove>,
        summary: BTreeMap<String, LabelSummary>,
    ) -> Result<BackupRecord> {
        let now = chrono::Local::now();
        let total_size = summary.values().map(|s| s.size).sum();

        let record = BackupRecord {
            timestamp: now.format("%Y-%m-%d_%H-%M-%S").to_string(),
            date_readable: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            stats: BackupStats {
                total_files: moves.len(),
                total_size,
                total_folders: summary.len(),
                folders: summary.keys().cloned().collect(),
            },
            moves,
            summary,
        };

        let mut data = self.load();
        data.backups.push(record.clone());

        // Keep only the most recent records
        if data.backups.len() > OrganizeConfig::MAX_BACKUPS {
            let excess = data.backups.len() - OrganizeConfig::MAX_BACKUPS;
            data.backups.drain(..excess);
        }

        atomic_write_json(&self.path, &data).map_err(|e| CurioError::BackupFailed {
            message: e.to_string(),
        })?;

        info!("Backup saved: {}", record.timestamp);
        Ok(record)
    }

    /// The most recent backup record, if any.
    pub fn latest(&self) -> Option<BackupRecord> {
        self.load().backups.pop()
    }

    /// All stored records, oldest first.
    pub fn all(&self) -> Vec<BackupRecord> {
        self.load().backups
    }

    fn load(&self) -> BackupFileData {
        match atomic_read_json::<BackupFileData>(&self.path) {
            Ok(Some(data)) => data,
            Ok(None) => BackupFileData::default(),
            Err(e) => {
                // A malformed store means "nothing to roll back", not a crash
                warn!("Ignoring malformed backup store {}: {}", self.path.display(), e);
                BackupFileData::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_move(index: usize) -> OrganizationMove {
        OrganizationMove {
            source: PathBuf::from(format!("/lib/m{}.safetensors", index)),
            target: PathBuf::from(format!("/lib/SDXL/m{}.safetensors", index)),
            label: "SDXL".into(),
            display_name: format!("m{}.safetensors", index),
            size_bytes: 100,
        }
    }

    fn sample_summary() -> BTreeMap<String, LabelSummary> {
        let mut summary = BTreeMap::new();
        summary.insert("SDXL".to_string(), LabelSummary { count: 1, size: 100 });
        summary
    }

    #[test]
    fn test_save_and_latest() {
        let tmp = TempDir::new().unwrap();
        let store = BackupStore::new(tmp.path());

        let record = store.save(vec![sample_move(0)], sample_summary()).unwrap();
        assert_eq!(record.stats.total_files, 1);
        assert_eq!(record.stats.total_size, 100);

        let latest = store.latest().unwrap();
        assert_eq!(latest.timestamp, record.timestamp);
        assert_eq!(latest.moves.len(), 1);
    }

    #[test]
    fn test_ring_keeps_last_five() {
        let tmp = TempDir::new().unwrap();
        let store = BackupStore::new(tmp.path());

        for i in 0..7 {
            store.save(vec![sample_move(i)], sample_summary()).unwrap();
        }

        let all = store.all();
        assert_eq!(all.len(), OrganizeConfig::MAX_BACKUPS);
        // Oldest two were dropped
        assert!(all[0].moves[0].source.ends_with("m2.safetensors"));
        assert!(all[4].moves[0].source.ends_with("m6.safetensors"));
    }

    #[test]
    fn test_empty_store_has_no_latest() {
        let tmp = TempDir::new().unwrap();
        let store = BackupStore::new(tmp.path());
        assert!(store.latest().is_none());
    }

    #[test]
    fn test_malformed_store_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(PathsConfig::BACKUP_FILENAME), b"{oops").unwrap();

        let store = BackupStore::new(tmp.path());
        assert!(store.latest().is_none());
    }
}
