//! Serialized download queue.
//!
//! One item transfers at a time; everything else waits inert and can be
//! reordered or removed. Every state transition is mirrored into a durable
//! log so interrupted downloads survive a process restart.

mod item;
mod log;
mod manager;

pub use item::{NewDownload, QueueItem};
pub use log::{DownloadLog, DownloadLogEntry, DownloadStatus};
pub use manager::{DownloadOutcome, Enqueue, QueueManager, QueueSettings};
