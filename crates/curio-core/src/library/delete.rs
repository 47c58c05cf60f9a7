//! Artifact deletion.
//!
//! Removing a model takes its sidecars, any archive members recorded in its
//! `unpackList`, and stray daemon control files with it. Per-file errors are
//! collected, never fatal.

use crate::config::PathsConfig;
use crate::library::scan::collect_installed_hashes;
use crate::metadata::{sidecar_paths, SidecarStore};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// What a delete operation removed and what it could not.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl DeleteReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn remove(&mut self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Deleted {}", path.display());
                self.removed.push(path.to_path_buf());
            }
            Err(e) => {
                warn!("Could not delete {}: {}", path.display(), e);
                self.errors.push(format!("{}: {}", path.display(), e));
            }
        }
    }
}

/// Delete an artifact with every file that belongs to it.
pub fn delete_artifact(artifact: &Path) -> DeleteReport {
    let mut report = DeleteReport::default();

    // Archive members recorded at unpack time, resolved against the
    // artifact's directory
    if let Some(meta) = SidecarStore::read(artifact) {
        if let Some(dir) = artifact.parent() {
            for member in &meta.unpack_list {
                let member_path = dir.join(member);
                if member_path.is_file() {
                    report.remove(&member_path);
                }
            }
        }
    }

    for sidecar in sidecar_paths(artifact) {
        report.remove(&sidecar);
    }

    // A leftover daemon control file means an interrupted transfer
    let control = PathBuf::from(format!(
        "{}{}",
        artifact.to_string_lossy(),
        PathsConfig::DAEMON_CONTROL_SUFFIX
    ));
    if control.exists() {
        report.remove(&control);
    }

    if artifact.exists() {
        report.remove(artifact);
    }

    report
}

/// Find and delete the artifact whose sidecar records the given SHA256.
///
/// Searches the given directories; the first match wins. Returns an empty
/// report when nothing matches.
pub fn delete_by_sha256(dirs: &[PathBuf], sha256: &str) -> DeleteReport {
    let wanted = sha256.to_uppercase();

    // Cheap pre-check before walking for the owning sidecar
    if !collect_installed_hashes(dirs).contains(&wanted) {
        return DeleteReport::default();
    }

    for dir in dirs {
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            let Some(json_sha) = read_hash(path) else {
                continue;
            };
            if json_sha != wanted {
                continue;
            }

            if let Some(artifact) = locate_artifact_for_sidecar(path) {
                return delete_artifact(&artifact);
            }
            warn!(
                "Sidecar {} matches hash but no artifact file was found next to it",
                path.display()
            );
        }
    }

    DeleteReport::default()
}

/// Find and delete an artifact by its filename (with or without
/// extension). Used when no hash is recorded for a model.
pub fn delete_by_filename(dirs: &[PathBuf], filename: &str) -> DeleteReport {
    let wanted_stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    for dir in dirs {
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let is_artifact = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| {
                    PathsConfig::ARTIFACT_EXTENSIONS
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(ext))
                });
            let stem_matches = path
                .file_stem()
                .is_some_and(|s| s.to_string_lossy() == wanted_stem);
            if is_artifact && stem_matches {
                return delete_artifact(path);
            }
        }
    }

    DeleteReport::default()
}

fn read_hash(json_path: &Path) -> Option<String> {
    let doc: serde_json::Value = crate::metadata::atomic_read_json(json_path).ok().flatten()?;
    let sha = doc.get("sha256")?.as_str()?;
    (!sha.is_empty()).then(|| sha.to_uppercase())
}

/// Find the artifact file a `.json` sidecar belongs to.
fn locate_artifact_for_sidecar(json_path: &Path) -> Option<PathBuf> {
    let base = json_path.with_extension("");
    for ext in PathsConfig::ARTIFACT_EXTENSIONS {
        // Append rather than with_extension: base names may contain dots
        let candidate = PathBuf::from(format!("{}.{}", base.to_string_lossy(), ext));
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_delete_artifact_takes_sidecars_along() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("m.safetensors");
        write(&artifact, "weights");
        write(&tmp.path().join("m.json"), r#"{"sha256": "ABC"}"#);
        write(&tmp.path().join("m_0.png"), "img");
        write(&tmp.path().join("m.preview.png"), "img");
        write(&tmp.path().join("m.safetensors.aria2"), "ctl");

        let report = delete_artifact(&artifact);

        assert!(report.is_success());
        assert!(!artifact.exists());
        assert!(!tmp.path().join("m.json").exists());
        assert!(!tmp.path().join("m_0.png").exists());
        assert!(!tmp.path().join("m.preview.png").exists());
        assert!(!tmp.path().join("m.safetensors.aria2").exists());
    }

    #[test]
    fn test_delete_artifact_removes_unpack_list_members() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("pack.zip");
        write(&artifact, "zip");
        write(
            &tmp.path().join("pack.json"),
            r#"{"sha256": "ABC", "unpackList": ["inner_a.pt", "inner_b.pt"]}"#,
        );
        write(&tmp.path().join("inner_a.pt"), "a");
        write(&tmp.path().join("inner_b.pt"), "b");

        let report = delete_artifact(&artifact);

        assert!(report.is_success());
        assert!(!tmp.path().join("inner_a.pt").exists());
        assert!(!tmp.path().join("inner_b.pt").exists());
    }

    #[test]
    fn test_delete_by_sha256() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("m.safetensors");
        write(&artifact, "weights");
        write(&tmp.path().join("m.json"), r#"{"sha256": "abc123"}"#);
        write(&tmp.path().join("other.safetensors"), "other");
        write(&tmp.path().join("other.json"), r#"{"sha256": "def456"}"#);

        let report = delete_by_sha256(&[tmp.path().to_path_buf()], "ABC123");

        assert!(!artifact.exists());
        assert!(tmp.path().join("other.safetensors").exists());
        assert!(!report.removed.is_empty());
    }

    #[test]
    fn test_delete_by_filename() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{}"#);

        let report = delete_by_filename(&[tmp.path().to_path_buf()], "m.safetensors");
        assert!(!report.removed.is_empty());
        assert!(!tmp.path().join("m.safetensors").exists());
        assert!(!tmp.path().join("m.json").exists());
    }

    #[test]
    fn test_delete_by_unknown_sha256_is_empty() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.json"), r#"{"sha256": "abc"}"#);

        let report = delete_by_sha256(&[tmp.path().to_path_buf()], "FFFF");
        assert!(report.removed.is_empty());
        assert!(report.is_success());
    }
}
