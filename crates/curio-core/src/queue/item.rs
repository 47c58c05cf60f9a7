//! Queue item types.

use crate::registry::ModelResponse;
use std::path::PathBuf;

/// Enqueue request, as supplied by the front end.
#[derive(Debug, Clone)]
pub struct NewDownload {
    pub url: String,
    pub filename: String,
    pub install_dir: PathBuf,
    pub model_id: Option<u64>,
    pub model_name: String,
    pub version_name: String,
    /// Expected SHA256, any case; `"UNKNOWN"` means none.
    pub sha256: Option<String>,
    /// Whether to write the local `.json` sidecar on completion.
    pub create_sidecar: bool,
    /// Batch-originated items prefer the directory the model is already
    /// installed in over the enqueue-time path.
    pub from_batch: bool,
}

/// One pending download, exclusively owned by the queue manager.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Monotonically increasing, unique for the process lifetime.
    pub id: u64,
    pub url: String,
    pub filename: String,
    pub install_dir: PathBuf,
    pub model_id: Option<u64>,
    pub model_name: String,
    pub version_name: String,
    /// Normalized expected SHA256 (uppercase), when the registry knows one.
    pub expected_sha256: Option<String>,
    pub create_sidecar: bool,
    pub from_batch: bool,
    /// Whether the richer registry metadata has been fetched yet. Deferred
    /// from enqueue time so bulk enqueues stay cheap.
    pub metadata_fetched: bool,
    /// Full registry response, filled in lazily.
    pub model_response: Option<ModelResponse>,
    /// The same response as raw JSON, kept for the `.api_info.json` sidecar.
    pub model_raw: Option<serde_json::Value>,
    /// Directory the model is already installed in, filled in lazily.
    pub resolved_dir: Option<PathBuf>,
}

impl QueueItem {
    pub(crate) fn new(id: u64, request: NewDownload) -> Self {
        let expected_sha256 = request
            .sha256
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty() && s != "UNKNOWN");

        Self {
            id,
            url: request.url,
            filename: request.filename,
            install_dir: request.install_dir,
            model_id: request.model_id,
            model_name: request.model_name,
            version_name: request.version_name,
            expected_sha256,
            create_sidecar: request.create_sidecar,
            from_batch: request.from_batch,
            metadata_fetched: false,
            model_response: None,
            model_raw: None,
            resolved_dir: None,
        }
    }

    /// The directory this item will actually download into.
    ///
    /// Batch items follow the resolved existing install location when one
    /// was found; manually placed items always keep the path the user chose.
    pub fn effective_dir(&self) -> &PathBuf {
        if self.from_batch {
            self.resolved_dir.as_ref().unwrap_or(&self.install_dir)
        } else {
            &self.install_dir
        }
    }

    /// Full path of the artifact this item downloads.
    pub fn dest_path(&self) -> PathBuf {
        self.effective_dir().join(&self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewDownload {
        NewDownload {
            url: "https://example.com/api/download/models/1".into(),
            filename: "m.safetensors".into(),
            install_dir: PathBuf::from("/models/Lora"),
            model_id: Some(1),
            model_name: "M".into(),
            version_name: "m_v1".into(),
            sha256: Some("abc".into()),
            create_sidecar: true,
            from_batch: false,
        }
    }

    #[test]
    fn test_sha_is_normalized() {
        let item = QueueItem::new(1, request());
        assert_eq!(item.expected_sha256.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_unknown_sha_is_none() {
        let mut r = request();
        r.sha256 = Some("unknown".into());
        assert!(QueueItem::new(1, r).expected_sha256.is_none());

        let mut r = request();
        r.sha256 = None;
        assert!(QueueItem::new(1, r).expected_sha256.is_none());
    }

    #[test]
    fn test_effective_dir_prefers_resolved_for_batch() {
        let mut r = request();
        r.from_batch = true;
        let mut item = QueueItem::new(1, r);
        assert_eq!(item.effective_dir(), &PathBuf::from("/models/Lora"));

        item.resolved_dir = Some(PathBuf::from("/models/Lora/SDXL"));
        assert_eq!(item.effective_dir(), &PathBuf::from("/models/Lora/SDXL"));
    }

    #[test]
    fn test_effective_dir_manual_ignores_resolved() {
        let mut item = QueueItem::new(1, request());
        item.resolved_dir = Some(PathBuf::from("/models/Lora/SDXL"));
        assert_eq!(item.effective_dir(), &PathBuf::from("/models/Lora"));
    }
}
