//! Walk counters and the bounded warning log.

use serde::{Deserialize, Serialize};

use crate::error::{ScanWarning, WarningKind};

/// Summary counters for one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Regular files recorded.
    pub files: u64,
    /// Directories visited (including the root).
    pub directories: u64,
    /// Sum of recorded file sizes.
    pub total_size: u64,
    /// Entries skipped because their metadata could not be read.
    pub skipped_entries: u64,
    /// Directories whose contents could not be listed.
    pub skipped_directories: u64,
    /// Directories pruned because they sit on an excluded filesystem.
    pub pruned_mounts: u64,
    /// Symlinks, devices, pipes and sockets passed over.
    pub ignored_special: u64,
    /// Deepest level reached below the root.
    pub max_depth: u32,
}

impl WalkStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, size: u64, depth: u32) {
        self.files += 1;
        self.total_size += size;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Record a directory.
    pub fn record_dir(&mut self, depth: u32) {
        self.directories += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Count a warning under the matching counter.
    pub fn record_warning(&mut self, kind: WarningKind, is_directory: bool) {
        match kind {
            WarningKind::ExcludedMount => self.pruned_mounts += 1,
            WarningKind::ReadError => self.skipped_directories += 1,
            WarningKind::MetadataError => self.skipped_entries += 1,
            WarningKind::PermissionDenied if is_directory => self.skipped_directories += 1,
            WarningKind::PermissionDenied => self.skipped_entries += 1,
        }
    }
}

/// Warning list that stops growing at a fixed capacity.
///
/// A whole-filesystem walk can produce millions of warnings; only the first
/// `capacity` are kept, the rest are counted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarningLog {
    capacity: usize,
    warnings: Vec<ScanWarning>,
    dropped: u64,
}

impl WarningLog {
    /// Create a log keeping at most `capacity` warnings.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            warnings: Vec::new(),
            dropped: 0,
        }
    }

    /// Add a warning, or count it if the log is full.
    pub fn push(&mut self, warning: ScanWarning) {
        if self.warnings.len() < self.capacity {
            self.warnings.push(warning);
        } else {
            self.dropped += 1;
        }
    }

    /// Retained warnings.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Number of warnings that did not fit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Total warnings seen.
    pub fn total(&self) -> u64 {
        self.warnings.len() as u64 + self.dropped
    }
}
