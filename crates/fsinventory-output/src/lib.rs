//! Streaming CSV output for fsinventory.
//!
//! Records from a [`fsinventory_scan::Walk`] pass through a
//! [`StreamingWriter`], which holds at most one batch in memory and hands
//! full batches to a [`RecordSink`]. [`CsvSink`] is the file-backed sink;
//! [`InventoryRunner`] wires walker, writer and sink together and writes a
//! [`RunManifest`] beside the CSV.
//!
//! # Example
//!
//! ```no_run
//! use fsinventory_core::{CancelToken, InventoryConfig};
//! use fsinventory_output::InventoryRunner;
//!
//! let config = InventoryConfig::new("/", "file_inventory.csv");
//! let summary = InventoryRunner::new().run(&config, CancelToken::new())?;
//! println!("{} files", summary.stats.files);
//! # Ok::<(), fsinventory_core::InventoryError>(())
//! ```

mod columns;
mod csv_sink;
mod error;
mod manifest;
mod pipeline;
mod writer;

pub use columns::ColumnLayout;
pub use csv_sink::CsvSink;
pub use error::OutputError;
pub use manifest::{MANIFEST_SUFFIX, ManifestWarning, RowOrder, RunManifest, RunStatus, manifest_path};
pub use pipeline::{InventoryRunner, RunSummary};
pub use writer::{RecordSink, StreamingWriter, WriterStats};
