//! Error and warning types for inventory runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that end an inventory run.
///
/// Per-entry and per-directory failures never surface here; they are
/// absorbed by the walker and reported as [`ScanWarning`]s.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The output destination could not be created or written.
    #[error("Output failure at {path}: {message}")]
    Output { path: PathBuf, message: String },
}

impl InventoryError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory; its subtree was skipped.
    ReadError,
    /// Error reading metadata; the entry was skipped.
    MetadataError,
    /// Directory sits on an excluded filesystem and was pruned.
    ExcludedMount,
}

/// Non-fatal warning encountered during a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, keeping permission failures distinct.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error, fallback: WarningKind) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            _ => fallback,
        };
        Self::new(path, error.to_string(), kind)
    }

    /// Create a warning for a pruned mount point.
    pub fn excluded_mount(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Excluded filesystem: {}", path.display()),
            path,
            kind: WarningKind::ExcludedMount,
        }
    }
}
