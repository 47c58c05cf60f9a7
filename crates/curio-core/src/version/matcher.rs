//! Family/version token parsing and comparison.
//!
//! Pure functions: the same name string always yields the same identifier.
//! A "family" is the name with its trailing version token removed; it groups
//! releases of the same thing across versions (`flux_dev_v2`, `flux_dev_v3`).

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

/// Trailing version token patterns, tried in order; first match wins.
static VERSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // v1.0, _v2.1, -v3.2
        Regex::new(r"(?i)[_\-]?v(\d+\.\d+)$").unwrap(),
        // v1, _v2, -v3
        Regex::new(r"(?i)[_\-]?v(\d+)$").unwrap(),
    ]
});

/// A remainder that is itself just a version token ("v3", "2.1") means the
/// name has no real family.
static BARE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^v?\d+(\.\d+)?$").unwrap());

/// Family and numeric version parts extracted from a name string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIdentifier {
    pub family: Option<String>,
    pub parts: Vec<u32>,
}

/// Extract the family name and version parts from a name string.
///
/// Returns `family: None, parts: []` when no version token is present.
pub fn extract_version(name: &str) -> VersionIdentifier {
    for pattern in VERSION_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(name) {
            let matched = captures.get(0).unwrap();
            let version_str = captures.get(1).unwrap().as_str();

            let parts = version_str
                .split('.')
                .filter_map(|p| p.parse::<u32>().ok())
                .collect();

            let family = name[..matched.start()]
                .trim_matches(|c| matches!(c, '_' | '-' | ' ' | '.'))
                .to_string();
            let family = if family.is_empty() || BARE_VERSION.is_match(&family) {
                None
            } else {
                Some(family)
            };

            return VersionIdentifier { family, parts };
        }
    }

    VersionIdentifier {
        family: None,
        parts: Vec::new(),
    }
}

/// Compare two version part lists numerically.
///
/// Both lists are zero-padded to equal length, then compared
/// lexicographically, so `2.1 < 2.10` and `3 == 3.0`.
pub fn compare_parts(a: &[u32], b: &[u32]) -> Ordering {
    let max_len = a.len().max(b.len());
    for i in 0..max_len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
