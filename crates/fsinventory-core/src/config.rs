//! Inventory run configuration.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::codec::PathPolicy;
use crate::error::InventoryError;
use crate::fstype::ExcludedFsTypes;

/// Default number of records per output batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Configuration for one inventory run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct InventoryConfig {
    /// Root path to inventory.
    #[builder(default = "PathBuf::from(\"/\")")]
    pub root: PathBuf,

    /// CSV destination.
    #[builder(default = "PathBuf::from(\"file_inventory.csv\")")]
    pub output: PathBuf,

    /// Records held in memory before a batch is written.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Emit directory rows carrying subtree totals.
    #[builder(default = "false")]
    #[serde(default)]
    pub aggregate_directories: bool,

    /// Include the `change_time` column.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub track_change_time: bool,

    /// Encoding applied to names and paths.
    #[builder(default)]
    #[serde(default)]
    pub path_policy: PathPolicy,

    /// Filesystem types whose mounts are pruned.
    #[builder(default)]
    #[serde(default)]
    pub excluded_fs_types: ExcludedFsTypes,

    /// Maximum number of warnings kept for the run summary.
    #[builder(default = "1000")]
    #[serde(default = "default_max_warnings")]
    pub max_warnings: usize,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_warnings() -> usize {
    1000
}

impl InventoryConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        }
        if let Some(ref output) = self.output {
            if output.as_os_str().is_empty() {
                return Err("Output path cannot be empty".to_string());
            }
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl From<InventoryConfigBuilderError> for InventoryError {
    fn from(err: InventoryConfigBuilderError) -> Self {
        InventoryError::InvalidConfig {
            message: err.to_string(),
        }
    }
}

impl InventoryConfig {
    /// Create a new config builder.
    pub fn builder() -> InventoryConfigBuilder {
        InventoryConfigBuilder::default()
    }

    /// Create a config with defaults for everything but root and output.
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            aggregate_directories: false,
            track_change_time: true,
            path_policy: PathPolicy::default(),
            excluded_fs_types: ExcludedFsTypes::default(),
            max_warnings: 1000,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self::new("/", "file_inventory.csv")
    }
}
