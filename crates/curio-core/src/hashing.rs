//! Streaming hash computation and verification for artifact files.
//!
//! Files are read in fixed-size blocks through a running digest; the whole
//! file is never held in memory.

use crate::config::{DownloadConfig, PathsConfig};
use crate::error::{CurioError, Result};
use crate::metadata::{atomic_read_json, atomic_write_json};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Progress update during hashing of a large file.
#[derive(Debug, Clone)]
pub struct HashProgress {
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

/// Compute the SHA256 of a file as a lowercase hex string.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| CurioError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DownloadConfig::HASH_BLOCK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| CurioError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA256 of a file off the async runtime, with progress updates.
pub async fn compute_sha256_with_progress(
    path: impl AsRef<Path>,
    progress_tx: Option<mpsc::Sender<HashProgress>>,
) -> Result<String> {
    let path = path.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut file =
            std::fs::File::open(&path).map_err(|e| CurioError::io_with_path(e, &path))?;
        let total_bytes = file
            .metadata()
            .map_err(|e| CurioError::io_with_path(e, &path))?
            .len();

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; DownloadConfig::HASH_BLOCK_SIZE];
        let mut bytes_processed: u64 = 0;

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .map_err(|e| CurioError::io_with_path(e, &path))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            bytes_processed += bytes_read as u64;

            if let Some(ref tx) = progress_tx {
                let _ = tx.try_send(HashProgress {
                    bytes_processed,
                    total_bytes,
                });
            }
        }

        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| CurioError::Other(format!("Hash computation task failed: {}", e)))?
}

/// Verify a file's SHA256 against an expected value, case-insensitively.
///
/// Returns the actual lowercase hash on match, `HashMismatch` otherwise.
pub fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<String> {
    let actual = compute_sha256(path)?;
    let expected_lower = expected.to_lowercase();

    if actual == expected_lower {
        Ok(actual)
    } else {
        Err(CurioError::HashMismatch {
            expected: expected_lower,
            actual,
        })
    }
}

/// Destination for verified hashes.
///
/// After a verified download the engine can pre-register the artifact's hash
/// into whatever cache the host process maintains, so the model loads without
/// a recomputation. Registration is best-effort only: implementations log
/// failures, callers never see them.
pub trait HashCache: Send + Sync {
    fn register(&self, artifact: &Path, sha256: &str);
}

#[derive(Debug, Serialize, Deserialize)]
struct HashCacheEntry {
    mtime: i64,
    sha256: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct HashCacheData {
    hashes: HashMap<String, HashCacheEntry>,
}

/// File-backed [`HashCache`] keyed by absolute artifact path.
pub struct JsonHashCache {
    path: PathBuf,
}

impl JsonHashCache {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PathsConfig::HASH_CACHE_FILENAME),
        }
    }

    fn load(&self) -> HashCacheData {
        match atomic_read_json::<HashCacheData>(&self.path) {
            Ok(Some(data)) => data,
            Ok(None) => HashCacheData::default(),
            Err(e) => {
                warn!("Resetting malformed hash cache {}: {}", self.path.display(), e);
                HashCacheData::default()
            }
        }
    }

    /// Look up a cached hash, honoring the stored mtime.
    pub fn lookup(&self, artifact: &Path) -> Option<String> {
        let data = self.load();
        let entry = data.hashes.get(&artifact.to_string_lossy().into_owned())?;
        let mtime = file_mtime(artifact)?;
        (entry.mtime == mtime).then(|| entry.sha256.clone())
    }
}

impl HashCache for JsonHashCache {
    fn register(&self, artifact: &Path, sha256: &str) {
        let Some(mtime) = file_mtime(artifact) else {
            return;
        };

        let mut data = self.load();
        data.hashes.insert(
            artifact.to_string_lossy().into_owned(),
            HashCacheEntry {
                mtime,
                sha256: sha256.to_lowercase(),
            },
        );

        match atomic_write_json(&self.path, &data) {
            Ok(()) => debug!("Pre-cached hash for {}", artifact.display()),
            Err(e) => warn!("Could not update hash cache: {}", e),
        }
    }
}

fn file_mtime(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let duration = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(duration.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_sha256_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let hash = compute_sha256(file.path()).unwrap();
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_case_insensitive() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let hash = compute_sha256(file.path()).unwrap();
        assert!(verify_sha256(file.path(), &hash.to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let result = verify_sha256(file.path(), "0000000000000000");
        assert!(matches!(result, Err(CurioError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_sha256_with_progress() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 1024]).unwrap();
        file.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(32);
        let hash = compute_sha256_with_progress(file.path(), Some(tx))
            .await
            .unwrap();

        assert_eq!(hash.len(), 64);
        // Small file: at least the final update must have arrived
        let progress = rx.recv().await.unwrap();
        assert_eq!(progress.bytes_processed, 1024);
    }

    #[test]
    fn test_hash_cache_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model.safetensors");
        std::fs::write(&artifact, b"weights").unwrap();

        let cache = JsonHashCache::new(tmp.path());
        cache.register(&artifact, "ABCDEF");

        assert_eq!(cache.lookup(&artifact), Some("abcdef".to_string()));
    }

    #[test]
    fn test_hash_cache_missing_file_is_noop() {
        let tmp = TempDir::new().unwrap();
        let cache = JsonHashCache::new(tmp.path());
        cache.register(&tmp.path().join("gone.safetensors"), "abc");
        assert!(!tmp.path().join(PathsConfig::HASH_CACHE_FILENAME).exists());
    }
}
