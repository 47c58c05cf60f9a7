//! Lookup seam between the registry client and its consumers.

use crate::registry::types::VersionByHashResponse;
use crate::Result;
use async_trait::async_trait;

/// By-hash version lookup, implemented by [`super::RegistryClient`].
///
/// The Organization Planner depends on this trait rather than the concrete
/// client so offline behavior can be exercised without a network.
#[async_trait]
pub trait VersionLookup: Send + Sync {
    /// Resolve the version owning a file with the given SHA256.
    async fn version_by_hash(&self, sha256: &str) -> Result<VersionByHashResponse>;
}
