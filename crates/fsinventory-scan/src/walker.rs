//! Serial, mount-aware tree walker built on jwalk.

use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use jwalk::{DirEntry, Parallelism, WalkDir};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use fsinventory_core::{
    CancelToken, EntryKind, EntryRecord, InventoryConfig, InventoryError, PathCodec, ScanWarning,
    Timestamps, WalkStats, WarningKind, WarningLog,
};

use crate::aggregate::DirectorySizeAccumulator;
use crate::mounts::{Classification, MountTable};
use crate::progress::ScanProgress;

/// Files between two progress broadcasts.
const PROGRESS_INTERVAL: u64 = 1000;

type WalkItem = Result<DirEntry<((), ())>, jwalk::Error>;

/// Creates walks and broadcasts their progress.
#[derive(Debug)]
pub struct InventoryWalker {
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl InventoryWalker {
    /// Create a new walker.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Subscribe to walk progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Start a walk of `config.root`.
    ///
    /// Nothing is read until the returned iterator is advanced. If the root
    /// itself sits on an excluded filesystem the walk yields no records.
    pub fn walk(
        &self,
        config: &InventoryConfig,
        mounts: Arc<MountTable>,
        cancel: CancelToken,
    ) -> Result<Walk, InventoryError> {
        let root = config
            .root
            .canonicalize()
            .map_err(|e| InventoryError::io(&config.root, e))?;
        let root_metadata = fs::symlink_metadata(&root).map_err(|e| InventoryError::io(&root, e))?;
        if !root_metadata.is_dir() {
            return Err(InventoryError::NotADirectory { path: root });
        }

        let mut warnings = WarningLog::new(config.max_warnings);
        let mut stats = WalkStats::new();
        let pruned = Arc::new(Mutex::new(Vec::new()));

        let phase = if mounts.classify(&root) == Classification::Excluded {
            warn!(root = %root.display(), "Root is on an excluded filesystem, nothing to walk");
            stats.record_warning(WarningKind::ExcludedMount, true);
            warnings.push(ScanWarning::excluded_mount(&root));
            Phase::Done
        } else {
            Phase::Walking(build_walk(&root, mounts, Arc::clone(&pruned)))
        };

        let accumulator = config
            .aggregate_directories
            .then(|| DirectorySizeAccumulator::new(&root));

        Ok(Walk {
            phase,
            codec: PathCodec::new(config.path_policy),
            accumulator,
            pending_dirs: Vec::new(),
            unreadable: HashSet::new(),
            pruned,
            stats,
            warnings,
            cancel,
            cancelled: false,
            progress_tx: self.progress_tx.clone(),
            started: Instant::now(),
            root,
        })
    }
}

impl Default for InventoryWalker {
    fn default() -> Self {
        Self::new()
    }
}

/// Configure jwalk for a single-threaded, no-follow, name-sorted descent that
/// drops excluded directories before they are listed.
fn build_walk(
    root: &Path,
    mounts: Arc<MountTable>,
    pruned: Arc<Mutex<Vec<PathBuf>>>,
) -> Box<dyn Iterator<Item = WalkItem>> {
    let walker = WalkDir::new(root)
        .parallelism(Parallelism::Serial)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .process_read_dir(move |_depth, _dir, _state, children| {
            children.retain(|child| {
                let Ok(entry) = child else {
                    return true;
                };
                if !entry.file_type().is_dir() {
                    return true;
                }

                let path = entry.path();
                match mounts.classify(&path) {
                    Classification::Scannable => true,
                    Classification::Excluded => {
                        if let Ok(mut list) = pruned.lock() {
                            list.push(path);
                        }
                        false
                    }
                }
            });
        });

    Box::new(walker.into_iter())
}

enum Phase {
    /// Streaming entries from the directory descent.
    Walking(Box<dyn Iterator<Item = WalkItem>>),
    /// Descent finished; emitting aggregated directory records.
    Directories(std::vec::IntoIter<EntryRecord>),
    Done,
}

/// Final accounting for a walk.
#[derive(Debug, Clone)]
pub struct WalkReport {
    /// Canonical root that was walked.
    pub root: PathBuf,
    /// Counters.
    pub stats: WalkStats,
    /// Retained warnings.
    pub warnings: WarningLog,
    /// Whether the walk stopped on a cancellation request.
    pub cancelled: bool,
}

/// Lazy sequence of inventory records.
///
/// File records come out in traversal order (depth first, entries sorted by
/// name). With aggregation enabled, directory records follow once the
/// descent is complete, ordered by path so a parent precedes its children.
pub struct Walk {
    phase: Phase,
    root: PathBuf,
    codec: PathCodec,
    accumulator: Option<DirectorySizeAccumulator>,
    pending_dirs: Vec<(PathBuf, EntryRecord)>,
    unreadable: HashSet<PathBuf>,
    pruned: Arc<Mutex<Vec<PathBuf>>>,
    stats: WalkStats,
    warnings: WarningLog,
    cancel: CancelToken,
    cancelled: bool,
    progress_tx: broadcast::Sender<ScanProgress>,
    started: Instant,
}

impl Walk {
    /// Canonical root of this walk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Counters so far.
    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    /// Warnings retained so far.
    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    /// Whether the walk stopped on a cancellation request.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Consume the walk and return its accounting.
    pub fn into_report(self) -> WalkReport {
        WalkReport {
            root: self.root,
            stats: self.stats,
            warnings: self.warnings,
            cancelled: self.cancelled,
        }
    }

    fn visit(&mut self, mut entry: DirEntry<((), ())>) -> Option<EntryRecord> {
        let path = entry.path();
        let depth = entry.depth() as u32;

        if let Some(err) = entry.read_children_error.take() {
            self.skip_unreadable(path, err);
            return None;
        }

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping entry without metadata");
                self.warn(ScanWarning::from_io(&path, &err, WarningKind::MetadataError), false);
                return None;
            }
        };

        if metadata.is_file() {
            let size = metadata.len();
            self.stats.record_file(size, depth);
            if let Some(accumulator) = self.accumulator.as_mut() {
                accumulator.add_file(&path, size);
            }
            if self.stats.files % PROGRESS_INTERVAL == 0 {
                self.report_progress(&path);
            }
            Some(self.record(&path, &metadata, EntryKind::File, size))
        } else if metadata.is_dir() {
            self.stats.record_dir(depth);
            if let Some(accumulator) = self.accumulator.as_mut() {
                accumulator.register(&path);
                let record = self.record(&path, &metadata, EntryKind::Directory, 0);
                self.pending_dirs.push((path, record));
            }
            None
        } else {
            self.stats.ignored_special += 1;
            None
        }
    }

    fn record(
        &self,
        path: &Path,
        metadata: &Metadata,
        kind: EntryKind,
        size_bytes: u64,
    ) -> EntryRecord {
        let absolute_path = self.codec.encode_path(path);
        let name = match path.file_name() {
            Some(name) => self.codec.encode(name.as_encoded_bytes()).into_owned(),
            None => absolute_path.clone(),
        };

        let timestamps = Timestamps::from_metadata(metadata);
        match kind {
            EntryKind::File => EntryRecord::file(name, absolute_path, size_bytes, timestamps),
            EntryKind::Directory => EntryRecord::directory(name, absolute_path, timestamps),
        }
    }

    fn skip_unreadable(&mut self, path: PathBuf, err: jwalk::Error) {
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => WarningKind::PermissionDenied,
            _ => WarningKind::ReadError,
        };

        warn!(path = %path.display(), error = %err, "Skipping unreadable directory");
        self.unreadable.insert(path.clone());
        self.warn(ScanWarning::new(path, err.to_string(), kind), true);
    }

    fn drain_pruned(&mut self) {
        let paths = match self.pruned.lock() {
            Ok(mut list) if !list.is_empty() => std::mem::take(&mut *list),
            _ => return,
        };

        for path in paths {
            debug!(path = %path.display(), "Pruned excluded mount");
            self.warn(ScanWarning::excluded_mount(path), true);
        }
    }

    fn warn(&mut self, warning: ScanWarning, is_directory: bool) {
        self.stats.record_warning(warning.kind, is_directory);
        self.warnings.push(warning);
    }

    fn report_progress(&self, path: &Path) {
        let _ = self.progress_tx.send(ScanProgress::from_stats(
            &self.stats,
            path.to_path_buf(),
            self.started.elapsed(),
        ));
    }

    /// Attach final totals to the held directory records, sorted by path.
    fn finish_directories(&mut self) -> Vec<EntryRecord> {
        let Some(accumulator) = self.accumulator.take() else {
            return Vec::new();
        };

        let mut pending = std::mem::take(&mut self.pending_dirs);
        pending.retain(|(path, _)| !self.unreadable.contains(path));
        pending.sort_by(|a, b| a.0.cmp(&b.0));

        pending
            .into_iter()
            .map(|(path, mut record)| {
                record.size_bytes = accumulator.total(&path).unwrap_or(0);
                record
            })
            .collect()
    }
}

impl Iterator for Walk {
    type Item = EntryRecord;

    fn next(&mut self) -> Option<EntryRecord> {
        loop {
            if !matches!(self.phase, Phase::Done) && self.cancel.is_cancelled() {
                info!(files = self.stats.files, "Walk cancelled");
                self.cancelled = true;
                self.phase = Phase::Done;
            }

            let item = match &mut self.phase {
                Phase::Walking(entries) => entries.next(),
                Phase::Directories(records) => return records.next(),
                Phase::Done => return None,
            };

            match item {
                Some(Ok(entry)) => {
                    self.drain_pruned();
                    if let Some(record) = self.visit(entry) {
                        return Some(record);
                    }
                }
                Some(Err(err)) => {
                    self.drain_pruned();
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    self.skip_unreadable(path, err);
                }
                None => {
                    self.drain_pruned();
                    self.report_progress(&self.root);
                    let directories = self.finish_directories();
                    debug!(directories = directories.len(), "Descent complete");
                    self.phase = Phase::Directories(directories.into_iter());
                }
            }
        }
    }
}
