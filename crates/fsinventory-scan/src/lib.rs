//! Mount-aware filesystem walker for fsinventory.
//!
//! This crate turns a directory tree into a lazy stream of
//! [`EntryRecord`]s.
//!
//! # Overview
//!
//! - **Mount classification**: the live mount table is read once; every
//!   directory is checked against it before its contents are listed, and
//!   directories on virtual or remote filesystems are pruned
//! - **Serial traversal** via jwalk, never following symlinks
//! - **Directory rollup**: optional subtree size totals per directory
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fsinventory_scan::{CancelToken, InventoryConfig, InventoryWalker, MountTable};
//!
//! let config = InventoryConfig::new("/srv", "srv.csv");
//! let mounts = MountTable::load(&config.excluded_fs_types).unwrap();
//!
//! let walker = InventoryWalker::new();
//! for record in walker.walk(&config, Arc::new(mounts), CancelToken::new()).unwrap() {
//!     println!("{} {}", record.absolute_path, record.size_bytes);
//! }
//! ```

mod aggregate;
mod mounts;
mod progress;
mod walker;

pub use aggregate::DirectorySizeAccumulator;
pub use mounts::{Classification, MountEntry, MountError, MountFormat, MountTable};
pub use progress::ScanProgress;
pub use walker::{InventoryWalker, Walk, WalkReport};

// Re-export core types for convenience
pub use fsinventory_core::{
    CancelToken, EntryKind, EntryRecord, ExcludedFsTypes, InventoryConfig, InventoryError,
    PathPolicy, ScanWarning, Timestamps, WalkStats, WarningKind,
};
