//! Run manifest written beside the CSV.
//!
//! The manifest records how the CSV was produced: the column order, the path
//! encoding policy, the excluded filesystem types, and whether the run
//! finished. Consumers need it to decode `%XX` escapes and to tell a partial
//! inventory from a complete one.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fsinventory_core::{
    ExcludedFsTypes, PathCodec, PathPolicy, ScanWarning, WalkStats, WarningKind,
};
use serde::{Deserialize, Serialize};

use crate::error::OutputError;
use crate::writer::WriterStats;

/// Suffix appended to the output file name.
pub const MANIFEST_SUFFIX: &str = ".manifest.json";

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// The walk finished and every record was written.
    Complete,
    /// Cancelled; the CSV holds every batch flushed before the stop.
    Cancelled,
    /// Output failed; the CSV holds the batches written before the failure.
    Failed { message: String },
}

impl RunStatus {
    /// Whether the CSV is a full inventory.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Row ordering guarantee for the CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Depth-first traversal, entries sorted by name.
    Traversal,
    /// Files in traversal order, then directories sorted by path.
    FilesThenDirectories,
}

/// A retained warning with its path in the run's encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestWarning {
    pub path: String,
    pub kind: WarningKind,
    pub message: String,
}

impl ManifestWarning {
    /// Encode a walk warning's path the same way CSV rows are encoded.
    pub fn from_warning(warning: &ScanWarning, codec: &PathCodec) -> Self {
        Self {
            path: codec.encode_path(&warning.path),
            kind: warning.kind,
            message: warning.message.clone(),
        }
    }
}

/// Sidecar describing one inventory run.
///
/// Paths are stored already encoded with the run's [`PathPolicy`], so a
/// manifest can always be written even when names are not valid UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Producing tool version.
    pub version: String,
    /// Canonical root that was walked, encoded.
    pub root: String,
    /// CSV path, encoded.
    pub output: String,
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Row ordering.
    pub row_order: RowOrder,
    /// Encoding applied to names and paths in the CSV and here.
    pub path_policy: PathPolicy,
    pub batch_size: usize,
    pub aggregate_directories: bool,
    /// Filesystem types that were pruned.
    pub excluded_fs_types: ExcludedFsTypes,
    /// Outcome.
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Walk counters.
    pub stats: WalkStats,
    /// Writer counters.
    pub writer: WriterStats,
    /// Retained warnings.
    pub warnings: Vec<ManifestWarning>,
    /// Warnings beyond the retention limit.
    pub warnings_dropped: u64,
}

impl RunManifest {
    /// Write the manifest as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), OutputError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| OutputError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| OutputError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read a manifest.
    pub fn read(path: &Path) -> Result<Self, OutputError> {
        let text = fs::read_to_string(path).map_err(|e| OutputError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| OutputError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Manifest location for a CSV: the CSV path with [`MANIFEST_SUFFIX`] appended.
pub fn manifest_path(output: &Path) -> PathBuf {
    let mut name: OsString = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("inventory"));
    name.push(MANIFEST_SUFFIX);
    output.with_file_name(name)
}
