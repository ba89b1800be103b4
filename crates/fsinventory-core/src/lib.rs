//! Core types for fsinventory.
//!
//! This crate provides the data model shared by the scanner and the output
//! layer: inventory records, run configuration, the path encoding policy,
//! the excluded filesystem type set, and error types.

mod cancel;
mod codec;
mod config;
mod error;
mod fstype;
mod record;
mod stats;

pub use cancel::CancelToken;
pub use codec::{CodecError, PathCodec, PathPolicy};
pub use config::{DEFAULT_BATCH_SIZE, InventoryConfig, InventoryConfigBuilder};
pub use error::{InventoryError, ScanWarning, WarningKind};
pub use fstype::ExcludedFsTypes;
pub use record::{EntryKind, EntryRecord, Timestamps};
pub use stats::{WalkStats, WarningLog};
