//! Output error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while persisting records.
///
/// Any of these ends the run. Batches written before the failure stay on
/// disk and remain a valid prefix of the inventory.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The destination could not be created.
    #[error("Cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A batch could not be written.
    #[error("Write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded as CSV.
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    /// An earlier batch failed; the writer accepts nothing more.
    #[error("Writer is unusable after an earlier write failure")]
    Poisoned,

    /// The run manifest could not be written or read.
    #[error("Manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },
}
