//! Organization planning.
//!
//! Computes the move list for a library without touching any file. Each
//! artifact's classification is resolved from metadata only; an artifact
//! whose base architecture cannot be determined is reported, never guessed.

use crate::cancel::CancellationToken;
use crate::library::scan_artifacts;
use crate::metadata::{atomic_read_json, SidecarMetadata, SidecarStore};
use crate::organize::classify::{classify_base_model, Classification};
use crate::registry::VersionLookup;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One planned relocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizationMove {
    #[serde(rename = "from")]
    pub source: PathBuf,
    #[serde(rename = "to")]
    pub target: PathBuf,
    #[serde(rename = "base_model")]
    pub label: String,
    #[serde(rename = "model_name")]
    pub display_name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Per-label aggregate for plan summaries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LabelSummary {
    pub count: usize,
    pub size: u64,
}

/// A move that was planned but whose target already exists.
#[derive(Debug, Clone)]
pub struct PlanConflict {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// The complete, read-only output of a planning pass.
#[derive(Debug, Default)]
pub struct OrganizationPlan {
    pub moves: Vec<OrganizationMove>,
    /// Non-fatal: targets that already exist are skipped, not overwritten.
    pub conflicts: Vec<PlanConflict>,
    pub summary: BTreeMap<String, LabelSummary>,
    pub total_files: usize,
    pub files_with_info: usize,
    /// Artifacts whose classification could not be resolved; excluded from
    /// `moves`.
    pub files_without_info: usize,
}

impl OrganizationPlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Builds [`OrganizationPlan`]s from library roots.
pub struct OrganizePlanner<'a> {
    /// By-hash registry lookup; `None` plans offline from sidecars alone.
    lookup: Option<&'a dyn VersionLookup>,
    /// Whether unmatched-but-real base models get an "Other" folder.
    use_other_folder: bool,
    /// Compute missing content hashes to enable the by-hash lookup. Off by
    /// default: hashing a whole library is expensive.
    compute_missing_hashes: bool,
}

impl<'a> OrganizePlanner<'a> {
    pub fn new(lookup: Option<&'a dyn VersionLookup>) -> Self {
        Self {
            lookup,
            use_other_folder: true,
            compute_missing_hashes: false,
        }
    }

    pub fn with_other_folder(mut self, enabled: bool) -> Self {
        self.use_other_folder = enabled;
        self
    }

    pub fn with_missing_hash_computation(mut self, enabled: bool) -> Self {
        self.compute_missing_hashes = enabled;
        self
    }

    /// Plan the reorganization of the artifacts under `roots`.
    ///
    /// Each artifact's move target stays under the root it was found in:
    /// `root/<label>/<filename>`.
    pub async fn plan(
        &self,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<OrganizationPlan> {
        let mut plan = OrganizationPlan::default();

        for root in roots {
            let artifacts = scan_artifacts(std::slice::from_ref(root));
            plan.total_files += artifacts.len();

            for artifact in artifacts {
                cancel.check()?;
                self.plan_one(root, &artifact, &mut plan).await;
            }
        }

        info!(
            "Planned {} moves ({} conflicts, {} files without metadata, {} total)",
            plan.moves.len(),
            plan.conflicts.len(),
            plan.files_without_info,
            plan.total_files
        );
        Ok(plan)
    }

    async fn plan_one(&self, root: &Path, artifact: &Path, plan: &mut OrganizationPlan) {
        let classification = self.resolve_classification(artifact).await;

        let Classification::Known(base_model) = classification else {
            debug!("No usable metadata for {}", artifact.display());
            plan.files_without_info += 1;
            return;
        };
        plan.files_with_info += 1;

        let Some(label) = classify_base_model(&base_model, self.use_other_folder) else {
            // Real base model, no folder policy for it: leave in place
            return;
        };

        // Already inside its classification folder
        let current_parent = artifact
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        if current_parent.as_deref() == Some(label.as_str()) {
            return;
        }

        let Some(file_name) = artifact.file_name() else {
            return;
        };
        let target = root.join(&label).join(file_name);

        if target.exists() {
            plan.conflicts.push(PlanConflict {
                source: artifact.to_path_buf(),
                target,
            });
            return;
        }

        let size_bytes = std::fs::metadata(artifact).map(|m| m.len()).unwrap_or(0);
        let entry = plan.summary.entry(label.clone()).or_default();
        entry.count += 1;
        entry.size += size_bytes;

        plan.moves.push(OrganizationMove {
            source: artifact.to_path_buf(),
            target,
            label,
            display_name: file_name.to_string_lossy().into_owned(),
            size_bytes,
        });
    }

    /// Resolve an artifact's base architecture.
    ///
    /// Priority: the registry-derived `.api_info.json` sidecar, then an
    /// on-demand by-hash registry lookup (cached back into the sidecar),
    /// then the legacy sidecar hint, whose sentinel values are rejected
    /// rather than trusted.
    async fn resolve_classification(&self, artifact: &Path) -> Classification {
        let sidecar = SidecarStore::read(artifact);

        if let Some(base) = read_api_info_base_model(artifact, sidecar.as_ref()) {
            let parsed = Classification::parse(Some(base.as_str()));
            if parsed != Classification::Unknown {
                return parsed;
            }
        }

        if let Some(lookup) = self.lookup {
            if let Some(sha256) = self.artifact_hash(artifact, sidecar.as_ref()).await {
                match lookup.version_by_hash(&sha256).await {
                    Ok(version) => {
                        let parsed = Classification::parse(version.base_model.as_deref());
                        if let Classification::Known(ref value) = parsed {
                            // Cache for the next offline run
                            let update = SidecarMetadata {
                                sha256: Some(sha256.to_uppercase()),
                                model_id: version.model_id,
                                model_version_id: Some(version.id),
                                base_model_hint: Some(value.clone()),
                                ..Default::default()
                            };
                            if let Err(e) = SidecarStore::merge(artifact, &update) {
                                warn!(
                                    "Could not cache registry result for {}: {}",
                                    artifact.display(),
                                    e
                                );
                            }
                            return parsed;
                        }
                    }
                    Err(e) => {
                        debug!(
                            "By-hash lookup failed for {}: {}",
                            artifact.display(),
                            e
                        );
                    }
                }
            }
        }

        // Offline fallback: legacy hint, sentinels rejected by parse()
        Classification::parse(
            sidecar
                .as_ref()
                .and_then(|s| s.base_model_hint.as_deref()),
        )
    }

    async fn artifact_hash(&self, artifact: &Path, sidecar: Option<&SidecarMetadata>) -> Option<String> {
        if let Some(sha) = sidecar.and_then(|s| s.sha256.clone()).filter(|s| !s.is_empty()) {
            return Some(sha);
        }
        if !self.compute_missing_hashes {
            return None;
        }
        match crate::hashing::compute_sha256_with_progress(artifact, None).await {
            Ok(sha) => Some(sha),
            Err(e) => {
                warn!("Could not hash {}: {}", artifact.display(), e);
                None
            }
        }
    }
}

/// Pull a base model out of the raw registry response sidecar.
///
/// The document is a full model response: prefer the version matching the
/// artifact's recorded hash, fall back to the newest version, and accept a
/// top-level `baseModel` for documents written by older tools.
fn read_api_info_base_model(artifact: &Path, sidecar: Option<&SidecarMetadata>) -> Option<String> {
    let path = SidecarStore::api_info_path(artifact);
    let doc: Value = atomic_read_json(&path).ok().flatten()?;

    if let Some(base) = doc.get("baseModel").and_then(|v| v.as_str()) {
        if !base.is_empty() {
            return Some(base.to_string());
        }
    }

    let versions = doc.get("modelVersions").and_then(|v| v.as_array())?;

    if let Some(wanted) = sidecar.and_then(|s| s.sha256.as_deref()) {
        for version in versions {
            let files = version.get("files").and_then(|f| f.as_array());
            let matches = files.is_some_and(|files| {
                files.iter().any(|f| {
                    f.get("hashes")
                        .and_then(|h| h.get("SHA256"))
                        .and_then(|s| s.as_str())
                        .is_some_and(|s| s.eq_ignore_ascii_case(wanted))
                })
            });
            if matches {
                if let Some(base) = version.get("baseModel").and_then(|v| v.as_str()) {
                    if !base.is_empty() {
                        return Some(base.to_string());
                    }
                }
            }
        }
    }

    versions
        .first()
        .and_then(|v| v.get("baseModel"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VersionByHashResponse;
    use crate::CurioError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedLookup(Option<String>);

    #[async_trait]
    impl VersionLookup for FixedLookup {
        async fn version_by_hash(&self, _sha256: &str) -> Result<VersionByHashResponse> {
            match &self.0 {
                Some(base) => Ok(VersionByHashResponse {
                    id: 99,
                    model_id: Some(9),
                    name: "style_v1".into(),
                    base_model: Some(base.clone()),
                }),
                None => Err(CurioError::RegistryOffline),
            }
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_plan_from_legacy_hint() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{"sd version": "SDXL 1.0"}"#);

        let planner = OrganizePlanner::new(None);
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].label, "SDXL");
        assert!(plan.moves[0].target.ends_with("SDXL/m.safetensors"));
        assert_eq!(plan.files_with_info, 1);
    }

    #[tokio::test]
    async fn test_sentinel_hint_is_not_trusted() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{"sd version": "uncategorized"}"#);

        let planner = OrganizePlanner::new(None);
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert!(plan.moves.is_empty());
        assert_eq!(plan.files_without_info, 1);
    }

    #[tokio::test]
    async fn test_no_hint_and_failed_lookup_is_never_guessed() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{"sha256": "ABC123"}"#);

        let lookup = FixedLookup(None);
        let planner = OrganizePlanner::new(Some(&lookup));
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert!(plan.moves.is_empty());
        assert_eq!(plan.files_without_info, 1);
    }

    #[tokio::test]
    async fn test_lookup_result_is_cached_into_sidecar() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{"sha256": "ABC123"}"#);

        let lookup = FixedLookup(Some("Pony".into()));
        let planner = OrganizePlanner::new(Some(&lookup));
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].label, "Pony");

        // Second pass must succeed offline from the cached hint
        let offline = OrganizePlanner::new(None);
        let plan2 = offline
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plan2.moves.len(), 1);
        assert_eq!(plan2.moves[0].label, "Pony");
    }

    #[tokio::test]
    async fn test_already_organized_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let sdxl = tmp.path().join("SDXL");
        std::fs::create_dir(&sdxl).unwrap();
        write(&sdxl.join("m.safetensors"), "weights");
        write(&sdxl.join("m.json"), r#"{"sd version": "SDXL 1.0"}"#);

        let planner = OrganizePlanner::new(None);
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert!(plan.moves.is_empty());
        assert_eq!(plan.files_with_info, 1);
    }

    #[tokio::test]
    async fn test_existing_target_is_a_conflict() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{"sd version": "SDXL 1.0"}"#);
        let sdxl = tmp.path().join("SDXL");
        std::fs::create_dir(&sdxl).unwrap();
        write(&sdxl.join("m.safetensors"), "already here");

        let planner = OrganizePlanner::new(None);
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert!(plan.moves.is_empty());
        assert_eq!(plan.conflicts.len(), 1);
    }

    #[tokio::test]
    async fn test_api_info_beats_legacy_hint() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("m.safetensors"), "weights");
        write(&tmp.path().join("m.json"), r#"{"sd version": "SD 1.5", "sha256": "AAA"}"#);
        write(
            &tmp.path().join("m.api_info.json"),
            r#"{"id": 1, "modelVersions": [
                {"baseModel": "Illustrious", "files": [{"hashes": {"SHA256": "AAA"}}]},
                {"baseModel": "Pony", "files": [{"hashes": {"SHA256": "BBB"}}]}
            ]}"#,
        );

        let planner = OrganizePlanner::new(None);
        let plan = planner
            .plan(&[tmp.path().to_path_buf()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].label, "Illustrious");
    }
}
