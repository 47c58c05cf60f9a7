//! Progress snapshots produced by the transfer paths.
//!
//! The worker writes snapshots into a bounded channel; the caller drains
//! them at its own cadence. UI code is never called from the worker.

use std::time::Instant;

/// One progress snapshot of an active transfer.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Bytes transferred so far.
    pub bytes_completed: u64,
    /// Total bytes, when the remote reported a length.
    pub total_bytes: Option<u64>,
    /// Transfer speed in bytes per second.
    pub speed_bytes_per_sec: f64,
    /// Percentage complete (0-100), when the total is known.
    pub percent: Option<f64>,
    /// Estimated seconds remaining; `None` when the speed is zero or the
    /// total is unknown.
    pub eta_seconds: Option<f64>,
}

impl TransferProgress {
    pub fn new(bytes_completed: u64, total_bytes: Option<u64>, speed: f64) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_completed as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        });

        let eta_seconds = total_bytes.and_then(|total| {
            if speed > 0.0 && bytes_completed < total {
                Some((total - bytes_completed) as f64 / speed)
            } else {
                None
            }
        });

        Self {
            bytes_completed,
            total_bytes,
            speed_bytes_per_sec: speed,
            percent,
            eta_seconds,
        }
    }
}

/// Average-speed tracker for the fallback downloader, which has no daemon
/// to report speed for it.
pub(crate) struct SpeedTracker {
    start_time: Instant,
    total_bytes: u64,
}

impl SpeedTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.total_bytes += bytes;
    }

    pub fn speed(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_bytes as f64 / elapsed
        } else {
            0.0
        }
    }
}
