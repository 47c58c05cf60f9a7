//! Base-architecture classification.
//!
//! Maps the registry's free-form `baseModel` strings onto the folder labels
//! the organizer files artifacts under.

use serde::{Deserialize, Serialize};

/// A classification resolved for an artifact.
///
/// Legacy sidecars store sentinel strings ("Unknown", "Not Found",
/// "uncategorized") where a real base model should be. Those parse to
/// `Unknown` here, so no call site can mistake a placeholder for a real
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Known(String),
    Unknown,
}

impl Classification {
    /// Parse a raw base-model string from a sidecar or registry response.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Classification::Unknown,
            Some(value) => {
                let trimmed = value.trim();
                let is_sentinel = trimmed.is_empty()
                    || trimmed.eq_ignore_ascii_case("unknown")
                    || trimmed.eq_ignore_ascii_case("not found")
                    || trimmed.eq_ignore_ascii_case("uncategorized")
                    || trimmed.eq_ignore_ascii_case("other");
                if is_sentinel {
                    Classification::Unknown
                } else {
                    Classification::Known(trimmed.to_string())
                }
            }
        }
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Classification::Known(label) => Some(label),
            Classification::Unknown => None,
        }
    }
}

/// Folder label -> detection patterns, checked in order. A pattern matches
/// when it appears as a substring of the upper-cased base model.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("SD", &["SD 1", "SD1", "SD 2", "SD2"]),
    ("SDXL", &["SDXL"]),
    ("Pony", &["PONY", "PONYXL", "PONY XL", "PONY V6", "PONYV6"]),
    ("Illustrious", &["ILLUSTRIOUS"]),
    ("FLUX", &["FLUX"]),
    ("Wan", &["WAN"]),
    ("Qwen", &["QWEN"]),
    ("Z-Image", &["Z-IMAGE", "ZIMAGE", "Z IMAGE"]),
    ("Lumina", &["LUMINA"]),
    ("Anima", &["ANIMA"]),
    ("Cascade", &["CASCADE"]),
    ("PixArt", &["PIXART", "PIX ART"]),
    ("Playground", &["PLAYGROUND"]),
    ("SVD", &["SVD", "STABLE VIDEO"]),
    ("Hunyuan", &["HUNYUAN"]),
    ("Kolors", &["KOLORS"]),
    ("AuraFlow", &["AURAFLOW", "AURA FLOW"]),
    ("Chroma", &["CHROMA"]),
];

/// Fallback label for base models no pattern matches.
pub const OTHER_LABEL: &str = "Other";

/// Resolve the folder label for a known base model string.
///
/// Only a [`Classification::Known`] value can be classified; an `Unknown`
/// artifact belongs in the planner's `files_without_info` bucket, never in
/// a guessed folder. `use_other_folder` controls whether real-but-unmatched
/// base models go to the "Other" folder or stay where they are (`None`).
pub fn classify_base_model(value: &str, use_other_folder: bool) -> Option<String> {
    let upper = value.to_uppercase();
    for (label, patterns) in CATEGORIES {
        if patterns.iter().any(|p| upper.contains(p)) {
            return Some((*label).to_string());
        }
    }

    use_other_folder.then(|| OTHER_LABEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_parse_to_unknown() {
        assert_eq!(Classification::parse(None), Classification::Unknown);
        assert_eq!(Classification::parse(Some("")), Classification::Unknown);
        assert_eq!(Classification::parse(Some("  ")), Classification::Unknown);
        assert_eq!(Classification::parse(Some("Unknown")), Classification::Unknown);
        assert_eq!(Classification::parse(Some("uncategorized")), Classification::Unknown);
        assert_eq!(Classification::parse(Some("Not Found")), Classification::Unknown);
    }

    #[test]
    fn test_real_values_parse_to_known() {
        assert_eq!(
            Classification::parse(Some("SDXL 1.0")),
            Classification::Known("SDXL 1.0".into())
        );
    }

    #[test]
    fn test_classify_common_bases() {
        for (raw, expected) in [
            ("SD 1.5", "SD"),
            ("SDXL 1.0", "SDXL"),
            ("Pony", "Pony"),
            ("Illustrious", "Illustrious"),
            ("Flux.1 D", "FLUX"),
            ("Wan Video", "Wan"),
        ] {
            let label = classify_base_model(raw, true);
            assert_eq!(label.as_deref(), Some(expected), "base model {}", raw);
        }
    }

    #[test]
    fn test_unmatched_goes_to_other_or_stays() {
        assert_eq!(
            classify_base_model("Experimental Arch", true).as_deref(),
            Some(OTHER_LABEL)
        );
        assert_eq!(classify_base_model("Experimental Arch", false), None);
    }
}
