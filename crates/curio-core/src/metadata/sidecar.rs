//! Sidecar document types and discovery.
//!
//! An artifact `model.safetensors` may be accompanied by `model.json` (local
//! metadata), `model.api_info.json` (raw registry response), `model.html`,
//! `model.preview.png`, and numbered preview images `model_0.png`,
//! `model_1.png`, ... All of them share the artifact's base name and must
//! travel with it when it is moved or deleted.

use crate::config::OrganizeConfig;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::{CurioError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Plain extensions that attach directly to the artifact's base name.
const EXACT_EXTENSIONS: &[&str] = &[
    ".json", ".png", ".jpg", ".jpeg", ".txt", ".html", ".civitai.info",
];

/// Suffixes inserted between the base name and the extension
/// (`model.preview.png`, `model.api_info.json`).
const COMPOUND_SUFFIXES: &[&str] = &[".preview", ".api_info", ".civitai"];

/// Image extensions used by numbered previews.
const PREVIEW_IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg"];

/// The subset of the local `.json` sidecar the engine reads and writes.
///
/// Unknown fields written by other tools are preserved: updates go through
/// [`SidecarStore::merge`], which patches keys into the existing document
/// instead of re-serializing this struct over it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SidecarMetadata {
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(rename = "modelId", default)]
    pub model_id: Option<u64>,
    #[serde(rename = "modelVersionId", default)]
    pub model_version_id: Option<u64>,
    /// Legacy classification hint. May hold a sentinel value that must not
    /// be trusted as a real classification; see `organize::Classification`.
    #[serde(rename = "sd version", default)]
    pub base_model_hint: Option<String>,
    #[serde(rename = "activation text", default)]
    pub activation_text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "modelPageURL", default)]
    pub model_page_url: Option<String>,
    /// Names of archive members extracted from a container download, so a
    /// later delete can remove them too.
    #[serde(rename = "unpackList", default)]
    pub unpack_list: Vec<String>,
}

/// Reads and updates the local `.json` sidecar for an artifact.
pub struct SidecarStore;

impl SidecarStore {
    /// Path of the local metadata sidecar for an artifact.
    pub fn json_path(artifact: &Path) -> PathBuf {
        artifact.with_extension("json")
    }

    /// Path of the raw registry response sidecar for an artifact.
    pub fn api_info_path(artifact: &Path) -> PathBuf {
        // Append rather than with_extension: base names may contain dots
        PathBuf::from(format!(
            "{}.api_info.json",
            base_name(artifact).to_string_lossy()
        ))
    }

    /// Read the sidecar for an artifact.
    ///
    /// A missing or malformed sidecar reads as `None`; malformed documents
    /// are logged but never fatal.
    pub fn read(artifact: &Path) -> Option<SidecarMetadata> {
        let path = Self::json_path(artifact);
        match atomic_read_json::<SidecarMetadata>(&path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Ignoring malformed sidecar {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge fields into the sidecar, preserving keys the engine does not
    /// know about (other tools store their own data in the same file).
    pub fn merge(artifact: &Path, updates: &SidecarMetadata) -> Result<()> {
        let path = Self::json_path(artifact);

        let mut doc: Map<String, Value> = match atomic_read_json::<Value>(&path) {
            Ok(Some(Value::Object(map))) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                warn!("Replacing malformed sidecar {}: {}", path.display(), e);
                Map::new()
            }
        };

        let patch = serde_json::to_value(updates).map_err(|e| CurioError::Json {
            message: format!("Failed to serialize sidecar update: {}", e),
            source: Some(e),
        })?;

        if let Value::Object(patch_map) = patch {
            for (key, value) in patch_map {
                // Skip empty updates so existing values are not clobbered
                match &value {
                    Value::Null => continue,
                    Value::Array(a) if a.is_empty() => continue,
                    _ => {}
                }
                doc.insert(key, value);
            }
        }

        atomic_write_json(&path, &Value::Object(doc))
    }

    /// Write the raw registry response next to the artifact.
    pub fn write_api_info(artifact: &Path, response: &Value) -> Result<()> {
        atomic_write_json(&Self::api_info_path(artifact), response)
    }
}

/// Artifact path with its extension stripped (`dir/model.safetensors` ->
/// `dir/model`).
fn base_name(artifact: &Path) -> PathBuf {
    artifact.with_extension("")
}

/// Enumerate every existing sidecar file for an artifact.
///
/// Covers exact-extension sidecars, numbered preview images up to the
/// configured index limit, and compound-suffix sidecars. The artifact file
/// itself is not included.
pub fn sidecar_paths(artifact: &Path) -> Vec<PathBuf> {
    let base = base_name(artifact);
    let base_str = base.to_string_lossy().into_owned();
    let mut found = Vec::new();

    for ext in EXACT_EXTENSIONS {
        let candidate = PathBuf::from(format!("{}{}", base_str, ext));
        if candidate.exists() {
            found.push(candidate);
        }
    }

    for i in 0..OrganizeConfig::PREVIEW_INDEX_LIMIT {
        for ext in PREVIEW_IMAGE_EXTENSIONS {
            let candidate = PathBuf::from(format!("{}_{}{}", base_str, i, ext));
            if candidate.exists() {
                found.push(candidate);
            }
        }
    }

    for suffix in COMPOUND_SUFFIXES {
        for ext in EXACT_EXTENSIONS {
            let candidate = PathBuf::from(format!("{}{}{}", base_str, suffix, ext));
            if candidate.exists() {
                found.push(candidate);
            }
        }
    }

    found
}

/// Translate a sidecar path from one artifact base to another.
///
/// Used when an artifact moves: `dir/model_0.png` with base `dir/model` and
/// new base `dir/SDXL/model` becomes `dir/SDXL/model_0.png`.
pub(crate) fn retarget_sidecar(sidecar: &Path, old_artifact: &Path, new_artifact: &Path) -> Option<PathBuf> {
    let old_base = base_name(old_artifact).to_string_lossy().into_owned();
    let new_base = base_name(new_artifact).to_string_lossy().into_owned();
    let sidecar_str = sidecar.to_string_lossy();
    sidecar_str
        .strip_prefix(&old_base)
        .map(|tail| PathBuf::from(format!("{}{}", new_base, tail)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_sidecar_discovery() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model.safetensors");
        touch(&artifact);
        touch(&tmp.path().join("model.json"));
        touch(&tmp.path().join("model.html"));
        touch(&tmp.path().join("model_0.png"));
        touch(&tmp.path().join("model_1.jpg"));
        touch(&tmp.path().join("model.preview.png"));
        touch(&tmp.path().join("model.api_info.json"));
        // Unrelated file must not be picked up
        touch(&tmp.path().join("other.json"));

        let sidecars = sidecar_paths(&artifact);
        assert_eq!(sidecars.len(), 6);
        assert!(!sidecars.iter().any(|p| p.ends_with("other.json")));
        assert!(!sidecars.contains(&artifact));
    }

    #[test]
    fn test_merge_preserves_unknown_fields() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model.safetensors");
        let json_path = tmp.path().join("model.json");
        fs::write(&json_path, r#"{"notes": "user notes", "sha256": "OLD"}"#).unwrap();

        let updates = SidecarMetadata {
            sha256: Some("ABC123".into()),
            model_id: Some(42),
            ..Default::default()
        };
        SidecarStore::merge(&artifact, &updates).unwrap();

        let doc: Value = atomic_read_json(&json_path).unwrap().unwrap();
        assert_eq!(doc["notes"], "user notes");
        assert_eq!(doc["sha256"], "ABC123");
        assert_eq!(doc["modelId"], 42);
    }

    #[test]
    fn test_merge_does_not_clobber_with_empty() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model.safetensors");
        let json_path = tmp.path().join("model.json");
        fs::write(&json_path, r#"{"sha256": "KEEP", "unpackList": ["a.bin"]}"#).unwrap();

        SidecarStore::merge(&artifact, &SidecarMetadata::default()).unwrap();

        let doc: Value = atomic_read_json(&json_path).unwrap().unwrap();
        assert_eq!(doc["sha256"], "KEEP");
        assert_eq!(doc["unpackList"][0], "a.bin");
    }

    #[test]
    fn test_read_malformed_is_none() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model.safetensors");
        fs::write(tmp.path().join("model.json"), b"{not json").unwrap();

        assert!(SidecarStore::read(&artifact).is_none());
    }

    #[test]
    fn test_retarget_sidecar() {
        let old = Path::new("/lib/model.safetensors");
        let new = Path::new("/lib/SDXL/model.safetensors");
        let moved = retarget_sidecar(Path::new("/lib/model_0.png"), old, new).unwrap();
        assert_eq!(moved, Path::new("/lib/SDXL/model_0.png"));
    }

    #[test]
    fn test_legacy_field_names_roundtrip() {
        let meta = SidecarMetadata {
            base_model_hint: Some("SDXL 1.0".into()),
            activation_text: Some("trigger".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("sd version"));
        assert!(json.contains("activation text"));
    }
}
