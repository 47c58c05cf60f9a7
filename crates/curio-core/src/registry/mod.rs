//! Remote registry access.
//!
//! Typed response structs for the subset of the registry API the engine
//! consumes, and a client that maps every failure to a typed outcome
//! instead of crashing on malformed responses.

mod client;
mod lookup;
mod types;

pub use client::RegistryClient;
pub use lookup::VersionLookup;
pub use types::{
    FileHashes, ModelResponse, ModelVersion, VersionByHashResponse, VersionFile, VersionImage,
};
