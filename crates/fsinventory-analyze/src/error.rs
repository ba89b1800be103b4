use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading an inventory for analysis.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The inventory file could not be opened.
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV could not be parsed.
    #[error("Malformed inventory: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from the header.
    #[error("Inventory has no `{column}` column")]
    MissingColumn { column: &'static str },
}
