//! Curio Core - Headless download and library organization engine.
//!
//! This crate manages a local library of large model artifacts fetched from
//! a remote registry: a serialized download queue driving an external
//! transfer daemon (with a resumable HTTP fallback), integrity verification
//! and sidecar metadata, update detection by family/version parsing, and a
//! plan/backup/execute/rollback file organizer. It has no UI; any front end
//! drives it through the operation-level APIs.
//!
//! # Example
//!
//! ```rust,ignore
//! use curio_library::{
//!     DaemonSupervisor, HttpClient, NewDownload, QueueManager, RegistryClient,
//!     TransferExecutor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let http = Arc::new(HttpClient::new().unwrap());
//!     let registry = Arc::new(RegistryClient::new(http.clone()));
//!     let supervisor = Arc::new(DaemonSupervisor::new(None));
//!     let executor = TransferExecutor::new(http, supervisor);
//!     let guard = curio_library::new_library_guard();
//!
//!     let queue = QueueManager::new("/data".as_ref(), registry, executor, guard);
//!     queue.enqueue(NewDownload { /* ... */ }).await;
//!     while let Some(outcome) = queue.run_next(None).await {
//!         println!("{}: {:?}", outcome.filename, outcome.status);
//!     }
//! }
//! ```

pub mod archive;
pub mod audit;
pub mod cancel;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hashing;
pub mod library;
pub mod metadata;
pub mod network;
pub mod organize;
pub mod queue;
pub mod registry;
pub mod transfer;
pub mod version;

// Re-export commonly used types
pub use audit::AuditLog;
pub use cancel::{CancellationToken, CancelledError};
pub use daemon::{Aria2Client, DaemonSupervisor};
pub use error::{CurioError, Result};
pub use hashing::{HashCache, JsonHashCache};
pub use library::{
    apply_retention, delete_artifact, delete_by_filename, delete_by_sha256, RetentionPolicy,
};
pub use metadata::{SidecarMetadata, SidecarStore};
pub use network::HttpClient;
pub use organize::{
    BackupRecord, BackupStore, Classification, ExecutionReport, OrganizationMove,
    OrganizationPlan, OrganizeExecutor, OrganizePlanner, OrganizeState,
};
pub use queue::{
    DownloadLogEntry, DownloadOutcome, DownloadStatus, Enqueue, NewDownload, QueueManager,
    QueueSettings,
};
pub use registry::{ModelResponse, ModelVersion, RegistryClient, VersionLookup};
pub use transfer::{TransferExecutor, TransferOutcome, TransferProgress, TransferRequest};
pub use version::{
    detect_updates, extract_version, resolve_update_versions, ModelUpdateEntry, UpdateReport,
};

use std::sync::Arc;

/// Guard serializing filesystem mutation of the artifact tree.
///
/// The download queue and the organizer both mutate the library; they share
/// one guard so a reorganize pass can never interleave with a half-written
/// download on overlapping paths.
pub type LibraryGuard = Arc<tokio::sync::Mutex<()>>;

/// Create a fresh library guard to share between a [`QueueManager`] and an
/// [`OrganizeExecutor`].
pub fn new_library_guard() -> LibraryGuard {
    Arc::new(tokio::sync::Mutex::new(()))
}
