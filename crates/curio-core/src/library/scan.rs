//! Library directory scanning.

use crate::config::PathsConfig;
use crate::metadata::atomic_read_json;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Collect every artifact file under the given directories.
///
/// Follows symlinks, recognizes files by extension, and skips the `_Trash`
/// subfolders the retention policy writes into.
pub fn scan_artifacts(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut artifacts = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.file_name() != PathsConfig::TRASH_DIR_NAME)
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_artifact = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| {
                    PathsConfig::ARTIFACT_EXTENSIONS
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(ext))
                });
            if is_artifact {
                artifacts.push(path.to_path_buf());
            }
        }
    }

    debug!("Scanned {} artifacts under {} directories", artifacts.len(), dirs.len());
    artifacts
}

/// Collect the SHA256 hashes recorded in sidecars under the given
/// directories, upper-cased. Malformed sidecars are skipped.
pub fn collect_installed_hashes(dirs: &[PathBuf]) -> HashSet<String> {
    let mut hashes = HashSet::new();

    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            if let Some(sha) = read_sidecar_hash(path) {
                hashes.insert(sha);
            }
        }
    }

    debug!("Found {} installed model hashes", hashes.len());
    hashes
}

fn read_sidecar_hash(json_path: &Path) -> Option<String> {
    let doc: Value = atomic_read_json(json_path).ok().flatten()?;
    let sha = doc.get("sha256")?.as_str()?;
    (!sha.is_empty()).then(|| sha.to_uppercase())
}
