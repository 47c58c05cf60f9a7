//! Retention policy for existing artifact files.
//!
//! Applied before a new version of a model is downloaded over an existing
//! file of the same name.

use crate::audit::AuditLog;
use crate::config::PathsConfig;
use crate::library::move_file;
use crate::{CurioError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// What to do with an existing file before re-downloading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Leave the old file in place; old and new co-exist (only possible when
    /// the filenames differ).
    Keep,
    /// Move the old file into a `_Trash/` subfolder next to it.
    Trash,
    /// Delete the old file.
    #[default]
    Replace,
}

/// Apply the retention policy to an existing file. A missing file is a no-op.
pub fn apply_retention(file_path: &Path, policy: RetentionPolicy, audit: &AuditLog) -> Result<()> {
    if !file_path.exists() {
        return Ok(());
    }

    match policy {
        RetentionPolicy::Keep => Ok(()),
        RetentionPolicy::Trash => {
            let parent = file_path
                .parent()
                .ok_or_else(|| CurioError::FileNotFound(file_path.to_path_buf()))?;
            let trash_dir = parent.join(PathsConfig::TRASH_DIR_NAME);
            std::fs::create_dir_all(&trash_dir)
                .map_err(|e| CurioError::io_with_path(e, &trash_dir))?;

            let file_name = file_path
                .file_name()
                .ok_or_else(|| CurioError::FileNotFound(file_path.to_path_buf()))?;
            let mut dest = trash_dir.join(file_name);

            if dest.exists() {
                // Timestamp suffix keeps repeated trashing from colliding
                let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                let stem = file_path.file_stem().unwrap_or_default().to_string_lossy();
                let ext = file_path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                dest = trash_dir.join(format!("{}_{}{}", stem, stamp, ext));
            }

            move_file(file_path, &dest)?;
            info!("Moved old model file to {}: {}", PathsConfig::TRASH_DIR_NAME, dest.display());
            audit.append(
                "retention_trash",
                serde_json::json!({
                    "old_file": file_path.to_string_lossy(),
                    "dest": dest.to_string_lossy(),
                }),
            );
            Ok(())
        }
        RetentionPolicy::Replace => {
            std::fs::remove_file(file_path).map_err(|e| CurioError::io_with_path(e, file_path))?;
            audit.append(
                "retention_replace",
                serde_json::json!({ "old_file": file_path.to_string_lossy() }),
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_noop() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::new(tmp.path());
        apply_retention(&tmp.path().join("gone.safetensors"), RetentionPolicy::Replace, &audit)
            .unwrap();
    }

    #[test]
    fn test_keep_leaves_file() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::new(tmp.path());
        let file = tmp.path().join("m.safetensors");
        std::fs::write(&file, b"old").unwrap();

        apply_retention(&file, RetentionPolicy::Keep, &audit).unwrap();
        assert!(file.exists());
    }

    #[test]
    fn test_replace_removes_file() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::new(tmp.path());
        let file = tmp.path().join("m.safetensors");
        std::fs::write(&file, b"old").unwrap();

        apply_retention(&file, RetentionPolicy::Replace, &audit).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_trash_moves_into_subfolder() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::new(tmp.path());
        let file = tmp.path().join("m.safetensors");
        std::fs::write(&file, b"old").unwrap();

        apply_retention(&file, RetentionPolicy::Trash, &audit).unwrap();

        assert!(!file.exists());
        assert!(tmp
            .path()
            .join(PathsConfig::TRASH_DIR_NAME)
            .join("m.safetensors")
            .exists());
    }

    #[test]
    fn test_trash_collision_gets_timestamp() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditLog::new(tmp.path());
        let trash = tmp.path().join(PathsConfig::TRASH_DIR_NAME);
        std::fs::create_dir_all(&trash).unwrap();
        std::fs::write(trash.join("m.safetensors"), b"earlier").unwrap();

        let file = tmp.path().join("m.safetensors");
        std::fs::write(&file, b"old").unwrap();

        apply_retention(&file, RetentionPolicy::Trash, &audit).unwrap();

        let entries = std::fs::read_dir(&trash).unwrap().count();
        assert_eq!(entries, 2);
    }
}
