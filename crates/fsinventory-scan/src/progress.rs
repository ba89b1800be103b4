//! Walk progress reporting.

use std::path::PathBuf;
use std::time::Duration;

use fsinventory_core::WalkStats;

/// Progress snapshot broadcast during a walk.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Files recorded so far.
    pub files: u64,
    /// Directories visited so far.
    pub directories: u64,
    /// Bytes recorded so far.
    pub bytes: u64,
    /// Entries and directories skipped after errors.
    pub skipped: u64,
    /// Mount points pruned so far.
    pub pruned_mounts: u64,
    /// Path most recently recorded.
    pub current_path: PathBuf,
    /// Time since the walk started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Snapshot the given counters.
    pub fn from_stats(stats: &WalkStats, current_path: PathBuf, elapsed: Duration) -> Self {
        Self {
            files: stats.files,
            directories: stats.directories,
            bytes: stats.total_size,
            skipped: stats.skipped_entries + stats.skipped_directories,
            pruned_mounts: stats.pruned_mounts,
            current_path,
            elapsed,
        }
    }

    /// Files recorded per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Bytes recorded per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}
