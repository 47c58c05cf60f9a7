//! Update detection for installed models.
//!
//! Compares the best installed version against the best available version,
//! grouped by family. All maps are scoped per remote model: two unrelated
//! models may share a family label (a common naming convention), and one
//! model's installed versions must never stand in for another's.

use crate::registry::{ModelResponse, ModelVersion};
use crate::version::matcher::{compare_parts, extract_version};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One model's update standing.
#[derive(Debug, Clone)]
pub struct ModelUpdateEntry {
    pub model_id: u64,
    pub name: String,
    pub model_type: String,
    /// Families whose installed version trails the registry. Empty for
    /// family-less models that are outdated as a whole.
    pub outdated_families: Vec<String>,
}

/// Partition of checked models into outdated and up-to-date.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub outdated: Vec<ModelUpdateEntry>,
    pub up_to_date: Vec<ModelUpdateEntry>,
}

/// Detect outdated models.
///
/// `installed_hashes` is the SHA256 set collected from local sidecars
/// (any case). Each model in `models` is judged only against its own
/// versions; a model with no recognized installed version counts as
/// up-to-date.
pub fn detect_updates(models: &[ModelResponse], installed_hashes: &HashSet<String>) -> UpdateReport {
    let installed: HashSet<String> = installed_hashes
        .iter()
        .map(|h| h.to_uppercase())
        .collect();

    let mut report = UpdateReport::default();

    for model in models {
        if model.model_versions.is_empty() {
            continue;
        }

        // Installed versions of THIS model, grouped by family
        let mut installed_by_family: HashMap<String, Vec<Vec<u32>>> = HashMap::new();
        let mut installed_unfamilied: Vec<Vec<u32>> = Vec::new();

        for version in &model.model_versions {
            let is_installed = version.files.iter().any(|f| {
                f.hashes
                    .sha256
                    .as_deref()
                    .is_some_and(|h| installed.contains(&h.to_uppercase()))
            });
            if !is_installed {
                continue;
            }

            let id = extract_version(&version.name);
            match id.family {
                Some(family) => installed_by_family.entry(family).or_default().push(id.parts),
                None => installed_unfamilied.push(id.parts),
            }
        }

        // Available versions of this model, grouped the same way
        let mut available_by_family: HashMap<String, Vec<Vec<u32>>> = HashMap::new();
        let mut available_unfamilied: Vec<Vec<u32>> = Vec::new();

        for version in &model.model_versions {
            let id = extract_version(&version.name);
            match id.family {
                Some(family) => available_by_family.entry(family).or_default().push(id.parts),
                None => available_unfamilied.push(id.parts),
            }
        }

        let mut outdated_families = Vec::new();
        let mut outdated = false;

        if !available_by_family.is_empty() {
            // Family comparison: each installed family is judged against the
            // best available release of that same family
            for (family, available) in &available_by_family {
                let Some(installed_versions) = installed_by_family.get(family) else {
                    continue;
                };

                let best_installed = best_of(installed_versions);
                let best_available = best_of(available);

                if compare_parts(best_installed, best_available) == Ordering::Less {
                    debug!(
                        "'{}' family '{}' outdated: {:?} < {:?}",
                        model.name, family, best_installed, best_available
                    );
                    outdated = true;
                    outdated_families.push(family.clone());
                }
            }
        } else if !installed_unfamilied.is_empty() {
            // No family information anywhere: single whole-model comparison
            let best_installed = best_of(&installed_unfamilied);
            let best_available = best_of(&available_unfamilied);
            if compare_parts(best_installed, best_available) == Ordering::Less {
                debug!(
                    "'{}' outdated: {:?} < {:?}",
                    model.name, best_installed, best_available
                );
                outdated = true;
            }
        }

        outdated_families.sort();
        let entry = ModelUpdateEntry {
            model_id: model.id,
            name: model.name.clone(),
            model_type: model.model_type.clone(),
            outdated_families,
        };

        if outdated {
            report.outdated.push(entry);
        } else {
            report.up_to_date.push(entry);
        }
    }

    report
}

/// Pick the versions to enqueue when updating a model.
///
/// For each family the user has installed, the latest available version of
/// that family is selected (deduplicated by version id) so a multi-family
/// install gets one update per family in a single batch. Falls back to the
/// newest version (index 0 in the registry response) when no installed
/// family is recognized.
pub fn resolve_update_versions<'a>(
    model: &'a ModelResponse,
    installed_hashes: &HashSet<String>,
) -> Vec<&'a ModelVersion> {
    let Some(newest) = model.model_versions.first() else {
        return Vec::new();
    };

    let installed: HashSet<String> = installed_hashes
        .iter()
        .map(|h| h.to_uppercase())
        .collect();

    // Latest available release per family: the registry lists versions
    // newest-first, so the first sighting of a family wins
    let mut latest_by_family: HashMap<String, &ModelVersion> = HashMap::new();
    let mut installed_families: Vec<String> = Vec::new();

    for version in &model.model_versions {
        let id = extract_version(&version.name);
        let Some(family) = id.family else { continue };

        latest_by_family.entry(family.clone()).or_insert(version);

        let is_installed = version.files.iter().any(|f| {
            f.hashes
                .sha256
                .as_deref()
                .is_some_and(|h| installed.contains(&h.to_uppercase()))
        });
        if is_installed && !installed_families.contains(&family) {
            installed_families.push(family);
        }
    }

    if installed_families.is_empty() {
        return vec![newest];
    }

    let mut seen_ids = HashSet::new();
    let mut result = Vec::new();
    for family in installed_families {
        if let Some(version) = latest_by_family.get(&family) {
            if seen_ids.insert(version.id) {
                result.push(*version);
            }
        }
    }

    if result.is_empty() {
        vec![newest]
    } else {
        result
    }
}

fn best_of(versions: &[Vec<u32>]) -> &[u32] {
    versions
        .iter()
        .max_by(|a, b| compare_parts(a, b))
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FileHashes, VersionFile};

    fn version(id: u64, name: &str, sha256: &str) -> ModelVersion {
        ModelVersion {
            id,
            name: name.to_string(),
            files: vec![VersionFile {
                name: format!("{}.safetensors", name),
                primary: true,
                hashes: FileHashes {
                    sha256: Some(sha256.to_string()),
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn model(id: u64, name: &str, versions: Vec<ModelVersion>) -> ModelResponse {
        ModelResponse {
            id,
            name: name.to_string(),
            model_type: "LORA".to_string(),
            model_versions: versions,
            ..Default::default()
        }
    }

    fn hashes(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_outdated_family_detected_once() {
        // Two versions of the same family installed; one newer available.
        // Exactly one outdated entry, not two.
        let m = model(
            1,
            "Example",
            vec![
                version(30, "style_v3", "HASH3"),
                version(20, "style_v2", "HASH2"),
                version(10, "style_v1", "HASH1"),
            ],
        );

        let report = detect_updates(&[m], &hashes(&["HASH1", "HASH2"]));
        assert_eq!(report.outdated.len(), 1);
        assert_eq!(report.up_to_date.len(), 0);
        assert_eq!(report.outdated[0].outdated_families, vec!["style"]);
    }

    #[test]
    fn test_latest_installed_is_up_to_date() {
        let m = model(
            1,
            "Example",
            vec![
                version(30, "style_v3", "HASH3"),
                version(20, "style_v2", "HASH2"),
            ],
        );

        let report = detect_updates(&[m], &hashes(&["hash3"]));
        assert_eq!(report.outdated.len(), 0);
        assert_eq!(report.up_to_date.len(), 1);
    }

    #[test]
    fn test_family_state_does_not_leak_between_models() {
        // Both models use the family label "style". Model A has the latest
        // installed; model B has an old one installed. Only B is outdated;
        // A's installed v3 must not satisfy B's check.
        let a = model(
            1,
            "Model A",
            vec![
                version(30, "style_v3", "A3"),
                version(20, "style_v2", "A2"),
            ],
        );
        let b = model(
            2,
            "Model B",
            vec![
                version(31, "style_v3", "B3"),
                version(21, "style_v2", "B2"),
            ],
        );

        let report = detect_updates(&[a, b], &hashes(&["A3", "B2"]));
        assert_eq!(report.outdated.len(), 1);
        assert_eq!(report.outdated[0].model_id, 2);
    }

    #[test]
    fn test_multi_family_installs_tracked_independently() {
        let m = model(
            1,
            "Multi",
            vec![
                version(40, "pony_v2", "P2"),
                version(30, "pony_v1", "P1"),
                version(20, "illustrious_v2", "I2"),
                version(10, "illustrious_v1", "I1"),
            ],
        );

        // Old pony and old illustrious installed: both families outdated
        let report = detect_updates(&[m], &hashes(&["P1", "I1"]));
        assert_eq!(report.outdated.len(), 1);
        assert_eq!(
            report.outdated[0].outdated_families,
            vec!["illustrious", "pony"]
        );
    }

    #[test]
    fn test_familyless_model_falls_back_to_plain_comparison() {
        let m = model(
            1,
            "Plain",
            vec![version(20, "v2", "H2"), version(10, "v1", "H1")],
        );

        let report = detect_updates(&[m], &hashes(&["H1"]));
        assert_eq!(report.outdated.len(), 1);
        assert!(report.outdated[0].outdated_families.is_empty());
    }

    #[test]
    fn test_nothing_installed_is_up_to_date() {
        let m = model(1, "Empty", vec![version(10, "style_v1", "H1")]);
        let report = detect_updates(&[m], &hashes(&[]));
        assert_eq!(report.outdated.len(), 0);
        assert_eq!(report.up_to_date.len(), 1);
    }

    #[test]
    fn test_resolve_update_versions_one_per_family() {
        let m = model(
            1,
            "Multi",
            vec![
                version(40, "pony_v2", "P2"),
                version(30, "pony_v1", "P1"),
                version(20, "illustrious_v2", "I2"),
                version(10, "illustrious_v1", "I1"),
            ],
        );

        let picked = resolve_update_versions(&m, &hashes(&["P1", "I1"]));
        let ids: Vec<u64> = picked.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![40, 20]);
    }

    #[test]
    fn test_resolve_update_versions_fallback_to_newest() {
        let m = model(
            1,
            "Fresh",
            vec![version(40, "pony_v2", "P2"), version(30, "pony_v1", "P1")],
        );

        let picked = resolve_update_versions(&m, &hashes(&[]));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, 40);
    }
}
