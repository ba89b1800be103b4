//! End-to-end inventory run: walk, batch, write, record the manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fsinventory_core::{
    CancelToken, EntryRecord, InventoryConfig, InventoryError, PathCodec, WalkStats,
};
use fsinventory_scan::{InventoryWalker, MountTable, ScanProgress, Walk, WalkReport};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::columns::ColumnLayout;
use crate::csv_sink::CsvSink;
use crate::error::OutputError;
use crate::manifest::{ManifestWarning, RowOrder, RunManifest, RunStatus, manifest_path};
use crate::writer::{RecordSink, StreamingWriter, WriterStats};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Canonical root that was walked.
    pub root: PathBuf,
    /// Outcome.
    pub status: RunStatus,
    /// Walk counters.
    pub stats: WalkStats,
    /// Writer counters.
    pub writer: WriterStats,
    /// Warnings raised, including any not retained.
    pub warnings: u64,
    /// Manifest location, when one was written.
    pub manifest: Option<PathBuf>,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Runs inventories.
///
/// Owns the walker so callers can subscribe to progress before starting.
#[derive(Debug, Default)]
pub struct InventoryRunner {
    walker: InventoryWalker,
}

impl InventoryRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to walk progress.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.walker.subscribe()
    }

    /// Load the live mount table and run.
    ///
    /// An unreadable mount table does not abort the run; every path then
    /// classifies as excluded and the inventory comes out empty.
    pub fn run(
        &self,
        config: &InventoryConfig,
        cancel: CancelToken,
    ) -> Result<RunSummary, InventoryError> {
        let mounts = match MountTable::load(&config.excluded_fs_types) {
            Ok(table) => {
                info!(mounts = table.len(), "Loaded mount table");
                table
            }
            Err(err) => {
                warn!(error = %err, "Mount table unavailable; treating every path as excluded");
                MountTable::unavailable()
            }
        };
        self.run_with_mounts(config, mounts, cancel)
    }

    /// Run against `config.output` with a given mount table, then write the
    /// manifest beside it.
    pub fn run_with_mounts(
        &self,
        config: &InventoryConfig,
        mounts: MountTable,
        cancel: CancelToken,
    ) -> Result<RunSummary, InventoryError> {
        let started_at = Utc::now();
        let walk = self.walker.walk(config, Arc::new(mounts), cancel)?;

        let layout = ColumnLayout::from_config(config);
        let sink = CsvSink::create(&config.output, layout)
            .map_err(|err| output_error(config, &err))?;

        let started = Instant::now();
        let mut writer = StreamingWriter::new(sink, config.batch_size);
        let drained = drain(walk, &mut writer);
        let mut summary = summarize(&drained, writer.stats(), started.elapsed());

        let codec = PathCodec::new(config.path_policy);
        let manifest = RunManifest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            root: codec.encode_path(&drained.report.root),
            output: codec.encode_path(&config.output),
            columns: layout.header().into_iter().map(String::from).collect(),
            row_order: if config.aggregate_directories {
                RowOrder::FilesThenDirectories
            } else {
                RowOrder::Traversal
            },
            path_policy: config.path_policy,
            batch_size: config.batch_size,
            aggregate_directories: config.aggregate_directories,
            excluded_fs_types: config.excluded_fs_types.clone(),
            status: summary.status.clone(),
            started_at,
            finished_at: Utc::now(),
            stats: summary.stats.clone(),
            writer: summary.writer,
            warnings: drained
                .report
                .warnings
                .warnings()
                .iter()
                .map(|warning| ManifestWarning::from_warning(warning, &codec))
                .collect(),
            warnings_dropped: drained.report.warnings.dropped(),
        };
        let path = manifest_path(&config.output);
        match manifest.write(&path) {
            Ok(()) => summary.manifest = Some(path),
            Err(err) if drained.error.is_some() => warn!(error = %err, "Manifest not written"),
            Err(err) => return Err(output_error(config, &err)),
        }

        match drained.error {
            Some(err) => Err(output_error(config, &err)),
            None => Ok(summary),
        }
    }

    /// Run into an arbitrary sink. No manifest is written.
    ///
    /// Returns the sink on success so callers can inspect what it received.
    pub fn run_into<S: RecordSink>(
        &self,
        config: &InventoryConfig,
        mounts: MountTable,
        cancel: CancelToken,
        sink: S,
    ) -> Result<(RunSummary, S), InventoryError> {
        let walk = self.walker.walk(config, Arc::new(mounts), cancel)?;
        let started = Instant::now();
        let mut writer = StreamingWriter::new(sink, config.batch_size);
        let drained = drain(walk, &mut writer);

        if let Some(err) = &drained.error {
            return Err(output_error(config, err));
        }
        let summary = summarize(&drained, writer.stats(), started.elapsed());
        let (sink, _) = writer.finish().map_err(|err| output_error(config, &err))?;
        Ok((summary, sink))
    }
}

/// A consumed walk and the first output failure, if any.
struct Drained {
    report: WalkReport,
    error: Option<OutputError>,
}

/// Pull every record of a walk through the writer.
fn drain<S: RecordSink>(mut walk: Walk, writer: &mut StreamingWriter<S>) -> Drained {
    let error = pump(walk.by_ref(), writer);
    Drained {
        report: walk.into_report(),
        error,
    }
}

/// Append records until the source ends, then flush the trailing batch.
///
/// Stops at the first output failure. A cancelled walk simply ends early,
/// and the records it already produced are still flushed.
fn pump<I, S>(records: I, writer: &mut StreamingWriter<S>) -> Option<OutputError>
where
    I: Iterator<Item = EntryRecord>,
    S: RecordSink,
{
    let mut batches = 0;

    for record in records {
        if let Err(err) = writer.append(record) {
            return Some(err);
        }
        let stats = writer.stats();
        if stats.batches_written != batches {
            batches = stats.batches_written;
            info!(records = stats.records_written, "Processed records");
        }
    }

    writer.flush().err()
}

fn summarize(drained: &Drained, writer: WriterStats, elapsed: Duration) -> RunSummary {
    let report = &drained.report;
    let status = match (&drained.error, report.cancelled) {
        (Some(err), _) => RunStatus::Failed {
            message: err.to_string(),
        },
        (None, true) => RunStatus::Cancelled,
        (None, false) => RunStatus::Complete,
    };

    RunSummary {
        root: report.root.clone(),
        status,
        stats: report.stats.clone(),
        writer,
        warnings: report.warnings.total(),
        manifest: None,
        elapsed,
    }
}

fn output_error(config: &InventoryConfig, err: &OutputError) -> InventoryError {
    let path = match err {
        OutputError::Create { path, .. }
        | OutputError::Write { path, .. }
        | OutputError::Manifest { path, .. } => path.clone(),
        _ => config.output.clone(),
    };
    InventoryError::Output {
        path,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsinventory_core::ExcludedFsTypes;
    use std::fs;
    use tempfile::TempDir;

    /// Remembers every persisted record; fails on the given batch index.
    #[derive(Debug, Default)]
    struct Persisted {
        batches: Vec<Vec<String>>,
        fail_on: Option<usize>,
    }

    impl RecordSink for Persisted {
        fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError> {
            if self.fail_on == Some(self.batches.len()) {
                return Err(OutputError::Write {
                    path: "sink".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.batches
                .push(batch.iter().map(|r| r.name.to_string()).collect());
            Ok(())
        }
    }

    fn five_files() -> (TempDir, InventoryConfig, MountTable) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        for n in 0..5 {
            fs::write(root.join(format!("f{n}")), "x").unwrap();
        }
        let config = InventoryConfig::builder()
            .root(&root)
            .output(root.join("unused.csv"))
            .batch_size(2usize)
            .build()
            .unwrap();
        let mounts = MountTable::from_entries([(root, "ext4")], &ExcludedFsTypes::standard());
        (temp, config, mounts)
    }

    #[test]
    fn test_cancel_mid_batch_flushes_buffered_records() {
        let (_temp, config, mounts) = five_files();
        let cancel = CancelToken::new();
        let mut walk = InventoryWalker::new()
            .walk(&config, Arc::new(mounts), cancel.clone())
            .unwrap();
        let mut writer = StreamingWriter::new(Persisted::default(), config.batch_size);

        // Cancel right after the third record is handed out.
        let mut seen = 0;
        let records = walk.by_ref().inspect(|_| {
            seen += 1;
            if seen == 3 {
                cancel.cancel();
            }
        });
        let error = pump(records, &mut writer);
        assert!(error.is_none());

        let drained = Drained {
            report: walk.into_report(),
            error,
        };
        let summary = summarize(&drained, writer.stats(), Duration::ZERO);
        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.writer.records_written, 3);

        let (sink, _) = writer.finish().unwrap();
        assert_eq!(
            sink.batches,
            vec![vec!["f0".to_string(), "f1".to_string()], vec!["f2".to_string()]]
        );
    }

    #[test]
    fn test_write_failure_keeps_earlier_batches() {
        let (_temp, config, mounts) = five_files();
        let walk = InventoryWalker::new()
            .walk(&config, Arc::new(mounts), CancelToken::new())
            .unwrap();
        let sink = Persisted {
            fail_on: Some(1),
            ..Default::default()
        };
        let mut writer = StreamingWriter::new(sink, config.batch_size);

        let drained = drain(walk, &mut writer);
        assert!(drained.error.is_some());

        let summary = summarize(&drained, writer.stats(), Duration::ZERO);
        assert!(matches!(summary.status, RunStatus::Failed { .. }));
        assert_eq!(summary.writer.records_written, 2);
        assert_eq!(
            writer.sink().batches,
            vec![vec!["f0".to_string(), "f1".to_string()]]
        );
    }

    #[test]
    fn test_run_into_reports_failure_and_keeps_first_batch() {
        let (_temp, config, mounts) = five_files();
        let mut sink = Persisted {
            fail_on: Some(1),
            ..Default::default()
        };

        let err = InventoryRunner::new()
            .run_into(&config, mounts, CancelToken::new(), &mut sink)
            .unwrap_err();
        assert!(matches!(err, InventoryError::Output { .. }));
        assert_eq!(sink.batches.len(), 1);
        assert_eq!(sink.batches[0], vec!["f0", "f1"]);
    }
}
