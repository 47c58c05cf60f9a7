//! Version parsing and update detection.

mod matcher;
mod updates;

pub use matcher::{compare_parts, extract_version, VersionIdentifier};
pub use updates::{detect_updates, resolve_update_versions, ModelUpdateEntry, UpdateReport};
