//! Local transfer daemon (aria2) integration.
//!
//! The daemon runs as a separate process and performs the actual
//! multi-connection transfers; the engine drives it over JSON-RPC.

mod process;
mod rpc;

pub use process::DaemonSupervisor;
pub use rpc::{Aria2Client, DaemonTransferState, DaemonTransferStatus};
