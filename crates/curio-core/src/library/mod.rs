//! Library maintenance: scanning, retention, deletion.

mod delete;
mod retention;
mod scan;

pub use delete::{delete_artifact, delete_by_filename, delete_by_sha256, DeleteReport};
pub use retention::{apply_retention, RetentionPolicy};
pub use scan::{collect_installed_hashes, scan_artifacts};

use crate::{CurioError, Result};
use std::path::Path;

/// Move a file, falling back to copy+remove when rename fails across
/// filesystem boundaries.
pub(crate) fn move_file(source: &Path, target: &Path) -> Result<()> {
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !source.exists() {
                return Err(CurioError::io_with_path(rename_err, source));
            }
            std::fs::copy(source, target).map_err(|e| CurioError::io_with_path(e, target))?;
            std::fs::remove_file(source).map_err(|e| CurioError::io_with_path(e, source))?;
            Ok(())
        }
    }
}
