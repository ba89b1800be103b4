//! Per-directory subtree size rollup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Running subtree totals for every directory visited under one root.
///
/// Each file adds its size to every ancestor from its parent up to and
/// including the root, so the cost per file is proportional to its depth.
/// Owned by a single walk; independent walks never share one.
#[derive(Debug)]
pub struct DirectorySizeAccumulator {
    root: PathBuf,
    root_depth: usize,
    totals: HashMap<PathBuf, u64>,
}

impl DirectorySizeAccumulator {
    /// Create an accumulator for the tree under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root_depth = root.components().count();
        let mut totals = HashMap::new();
        totals.insert(root.clone(), 0);
        Self {
            root,
            root_depth,
            totals,
        }
    }

    /// Root of the accumulated tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start tracking a directory with a zero total.
    pub fn register(&mut self, dir: &Path) {
        if dir.starts_with(&self.root) && !self.totals.contains_key(dir) {
            self.totals.insert(dir.to_path_buf(), 0);
        }
    }

    /// Add a file's size to each of its ancestor directories.
    ///
    /// Files outside the root are ignored.
    pub fn add_file(&mut self, file: &Path, size: u64) {
        if !file.starts_with(&self.root) {
            return;
        }

        let levels = file.components().count().saturating_sub(self.root_depth);
        for dir in file.ancestors().skip(1).take(levels) {
            match self.totals.get_mut(dir) {
                Some(total) => *total += size,
                None => {
                    self.totals.insert(dir.to_path_buf(), size);
                }
            }
        }
    }

    /// Current total for a directory.
    pub fn total(&self, dir: &Path) -> Option<u64> {
        self.totals.get(dir).copied()
    }

    /// Number of tracked directories.
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// Check if no directories are tracked.
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}
