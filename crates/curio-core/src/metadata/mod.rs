//! Sidecar metadata persistence.
//!
//! Every artifact in the library may carry small JSON sidecars next to it;
//! this module owns reading and writing them safely.

mod atomic;
mod sidecar;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use sidecar::{sidecar_paths, SidecarMetadata, SidecarStore};

pub(crate) use sidecar::retarget_sidecar;
