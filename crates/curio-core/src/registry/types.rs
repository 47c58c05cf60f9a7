//! Typed registry response structs.
//!
//! Only the fields the engine actually consumes are modeled; everything is
//! optional or defaulted so a shape change on the registry side degrades to
//! missing data instead of a parse failure.

use serde::{Deserialize, Serialize};

/// A model as returned by `GET /models/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub model_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model_versions: Vec<ModelVersion>,
}

/// One published version of a model.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_model: Option<String>,
    /// `"EarlyAccess"` marks versions that must be purchased first.
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub files: Vec<VersionFile>,
    #[serde(default)]
    pub images: Vec<VersionImage>,
}

/// One downloadable file of a model version.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub hashes: FileHashes,
}

/// Hash digests published for a file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileHashes {
    #[serde(rename = "SHA256", default)]
    pub sha256: Option<String>,
}

/// A preview image attached to a model version.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionImage {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub nsfw_level: u32,
}

/// Response of `GET /model-versions/by-hash/{sha256}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionByHashResponse {
    /// The version id.
    pub id: u64,
    #[serde(default)]
    pub model_id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_model: Option<String>,
}

impl ModelVersion {
    /// Whether downloading this version requires an early-access purchase.
    pub fn is_early_access(&self) -> bool {
        self.availability.as_deref() == Some("EarlyAccess")
    }

    /// The primary file of this version, falling back to the first file.
    pub fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
    }

    /// Whether any of this version's files matches the given SHA256.
    pub fn contains_hash(&self, sha256: &str) -> bool {
        self.files.iter().any(|f| {
            f.hashes
                .sha256
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(sha256))
        })
    }
}

impl ModelResponse {
    /// Find the version containing a file with the given SHA256.
    pub fn version_by_hash(&self, sha256: &str) -> Option<&ModelVersion> {
        self.model_versions.iter().find(|v| v.contains_hash(sha256))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_response() {
        // Registry responses with missing fields must still parse
        let json = r#"{"id": 7, "modelVersions": [{"id": 70, "files": [{}]}]}"#;
        let model: ModelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(model.id, 7);
        assert_eq!(model.model_versions.len(), 1);
        assert!(model.model_versions[0].files[0].hashes.sha256.is_none());
    }

    #[test]
    fn test_early_access_detection() {
        let mut version = ModelVersion::default();
        assert!(!version.is_early_access());
        version.availability = Some("EarlyAccess".into());
        assert!(version.is_early_access());
        version.availability = Some("Public".into());
        assert!(!version.is_early_access());
    }

    #[test]
    fn test_primary_file_fallback() {
        let version = ModelVersion {
            files: vec![
                VersionFile {
                    name: "second.safetensors".into(),
                    ..Default::default()
                },
                VersionFile {
                    name: "main.safetensors".into(),
                    primary: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(version.primary_file().unwrap().name, "main.safetensors");

        let no_primary = ModelVersion {
            files: vec![VersionFile {
                name: "only.safetensors".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(no_primary.primary_file().unwrap().name, "only.safetensors");
    }

    #[test]
    fn test_version_by_hash_is_case_insensitive() {
        let model = ModelResponse {
            id: 1,
            model_versions: vec![ModelVersion {
                id: 10,
                files: vec![VersionFile {
                    hashes: FileHashes {
                        sha256: Some("ABCDEF".into()),
                    },
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(model.version_by_hash("abcdef").is_some());
        assert!(model.version_by_hash("123456").is_none());
    }
}
