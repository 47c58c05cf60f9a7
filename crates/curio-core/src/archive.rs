//! Container archive unpacking.
//!
//! Some registry files arrive as zip containers. Unpacking records every
//! extracted member name so a later delete can remove them too.

use crate::{CurioError, Result};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};
use zip::ZipArchive;

/// Extract a zip archive into `dest_dir`, returning the extracted member
/// names (relative to `dest_dir`).
///
/// Entries with unsafe paths (absolute, or escaping the destination) are
/// skipped with a warning rather than failing the whole archive.
pub fn unpack_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path).map_err(|e| CurioError::io_with_path(e, archive_path))?;
    let mut archive = ZipArchive::new(file).map_err(|e| CurioError::Other(format!(
        "Failed to read archive {}: {}",
        archive_path.display(),
        e
    )))?;

    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            CurioError::Other(format!(
                "Failed to read archive entry {} of {}: {}",
                index,
                archive_path.display(),
                e
            ))
        })?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(
                "Skipping archive entry with unsafe path: {}",
                entry.name()
            );
            continue;
        };
        let target = dest_dir.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| CurioError::io_with_path(e, &target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CurioError::io_with_path(e, parent))?;
        }

        let mut out = File::create(&target).map_err(|e| CurioError::io_with_path(e, &target))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| CurioError::io_with_path(e, &target))?;

        extracted.push(relative.to_string_lossy().into_owned());
    }

    info!(
        "Extracted {} members from {}",
        extracted.len(),
        archive_path.display()
    );
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn make_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_unpack_tracks_member_names() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("pack.zip");
        make_zip(&archive, &[("a.pt", b"aaa"), ("sub/b.pt", b"bbb")]);

        let members = unpack_zip(&archive, tmp.path()).unwrap();

        assert_eq!(members.len(), 2);
        assert!(members.contains(&"a.pt".to_string()));
        assert!(tmp.path().join("a.pt").exists());
        assert!(tmp.path().join("sub").join("b.pt").exists());
    }

    #[test]
    fn test_unpack_missing_archive_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(unpack_zip(&tmp.path().join("gone.zip"), tmp.path()).is_err());
    }
}
