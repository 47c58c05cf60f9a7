//! Append-only JSONL audit log.
//!
//! One standalone JSON object per line: `{timestamp, action, ...details}`.
//! Recording is best-effort; a failed write is logged and swallowed.

use crate::config::PathsConfig;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Audit trail for retention, organization, and rollback actions.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PathsConfig::AUDIT_LOG_FILENAME),
        }
    }

    /// Append one entry. `details` must be a JSON object.
    pub fn append(&self, action: &str, details: Value) {
        let mut entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "action": action,
        });
        if let (Value::Object(entry_map), Value::Object(details_map)) = (&mut entry, details) {
            entry_map.extend(details_map);
        }

        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Could not serialize audit entry: {}", e);
                return;
            }
        };

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{}", line));

        if let Err(e) = result {
            warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_is_jsonl() {
        let tmp = TempDir::new().unwrap();
        let log = AuditLog::new(tmp.path());

        log.append("retention_trash", json!({"old_file": "/a", "dest": "/b"}));
        log.append("organize_execute", json!({"moves": 3}));

        let content =
            std::fs::read_to_string(tmp.path().join(PathsConfig::AUDIT_LOG_FILENAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "retention_trash");
        assert_eq!(first["old_file"], "/a");
        assert!(first["timestamp"].is_string());
    }
}
