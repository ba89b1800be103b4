//! Analysis of persisted fsinventory CSVs.
//!
//! # Timeline
//!
//! Groups file rows by calendar month of their modification (or access)
//! time:
//!
//! ```rust,no_run
//! use std::path::Path;
//! use fsinventory_analyze::{TimelineAnalyzer, TimelineConfig};
//!
//! let config = TimelineConfig::builder().since_years(Some(5u32)).build().unwrap();
//! let report = TimelineAnalyzer::with_config(config)
//!     .analyze_path(Path::new("file_inventory.csv"))?;
//!
//! for bucket in &report.buckets {
//!     println!("{}: {} files", bucket.month, bucket.file_count);
//! }
//! # Ok::<(), fsinventory_analyze::AnalyzeError>(())
//! ```

mod error;
pub mod timeline;

pub use error::AnalyzeError;
pub use timeline::{
    MonthBucket, SampleFile, TimeField, TimelineAnalyzer, TimelineConfig, TimelineConfigBuilder,
    TimelineReport,
};
