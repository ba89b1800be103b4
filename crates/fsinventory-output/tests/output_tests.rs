use std::fs;
use std::path::{Path, PathBuf};

use fsinventory_core::{
    CancelToken, EntryRecord, ExcludedFsTypes, InventoryConfig, InventoryError, PathPolicy,
    Timestamps, WarningKind,
};
use fsinventory_output::{
    ColumnLayout, CsvSink, InventoryRunner, OutputError, RecordSink, RowOrder, RunManifest,
    RunStatus, StreamingWriter, manifest_path,
};
use fsinventory_scan::MountTable;
use proptest::prelude::*;
use tempfile::TempDir;

/// Sink that remembers the size of every batch it receives.
#[derive(Default)]
struct BatchRecorder {
    sizes: Vec<usize>,
    names: Vec<String>,
}

impl RecordSink for BatchRecorder {
    fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError> {
        self.sizes.push(batch.len());
        self.names
            .extend(batch.iter().map(|record| record.name.to_string()));
        Ok(())
    }
}

fn local_mounts(root: &Path) -> MountTable {
    MountTable::from_entries([(root.to_path_buf(), "ext4")], &ExcludedFsTypes::standard())
}

/// `root/a/file1` (100 B), `root/a/b/file2` (50 B) and
/// `root/excluded_mount/file3` on an nfs mount.
fn fixture() -> (TempDir, PathBuf, MountTable) {
    let temp = TempDir::new().unwrap();
    let base = temp.path().canonicalize().unwrap();
    let root = base.join("root");
    fs::create_dir_all(root.join("a/b")).unwrap();
    fs::create_dir_all(root.join("excluded_mount")).unwrap();
    fs::write(root.join("a/file1"), vec![1u8; 100]).unwrap();
    fs::write(root.join("a/b/file2"), vec![2u8; 50]).unwrap();
    fs::write(root.join("excluded_mount/file3"), vec![3u8; 10]).unwrap();

    let mounts = MountTable::from_entries(
        [
            (root.clone(), "ext4"),
            (root.join("excluded_mount"), "nfs"),
        ],
        &ExcludedFsTypes::standard(),
    );
    (temp, root, mounts)
}

#[test]
fn test_five_files_with_batch_size_two() {
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

    let (summary, sink) = InventoryRunner::new()
        .run_into(
            &config,
            local_mounts(&root),
            CancelToken::new(),
            BatchRecorder::default(),
        )
        .unwrap();

    assert_eq!(sink.sizes, vec![2, 2, 1]);
    assert_eq!(sink.names, vec!["f0", "f1", "f2", "f3", "f4"]);
    assert_eq!(summary.writer.batches_written, 3);
    assert_eq!(summary.writer.records_written, 5);
    assert_eq!(summary.status, RunStatus::Complete);
}

#[test]
fn test_csv_and_manifest_for_aggregated_run() {
    let (temp, root, mounts) = fixture();
    let output = temp.path().join("inventory.csv");
    let config = InventoryConfig::builder()
        .root(&root)
        .output(&output)
        .aggregate_directories(true)
        .track_change_time(false)
        .build()
        .unwrap();

    let summary = InventoryRunner::new()
        .run_with_mounts(&config, mounts, CancelToken::new())
        .unwrap();
    assert!(summary.status.is_complete());
    assert_eq!(summary.stats.pruned_mounts, 1);

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["name", "absolute_path", "access_time", "modification_time", "size_bytes", "kind"]
    );

    let rows: Vec<(String, String, String, String)> = reader
        .records()
        .map(|row| {
            let row = row.unwrap();
            (
                row[0].to_string(),
                row[1].to_string(),
                row[4].to_string(),
                row[5].to_string(),
            )
        })
        .collect();

    let root_str = root.to_string_lossy().into_owned();
    let expected = vec![
        ("file2".to_string(), format!("{root_str}/a/b/file2"), "50".to_string(), "file".to_string()),
        ("file1".to_string(), format!("{root_str}/a/file1"), "100".to_string(), "file".to_string()),
        ("root".to_string(), root_str.clone(), "150".to_string(), "directory".to_string()),
        ("a".to_string(), format!("{root_str}/a"), "150".to_string(), "directory".to_string()),
        ("b".to_string(), format!("{root_str}/a/b"), "50".to_string(), "directory".to_string()),
    ];
    assert_eq!(rows, expected);

    let manifest = RunManifest::read(&manifest_path(&output)).unwrap();
    assert_eq!(summary.manifest, Some(manifest_path(&output)));
    assert_eq!(manifest.status, RunStatus::Complete);
    assert_eq!(manifest.row_order, RowOrder::FilesThenDirectories);
    assert_eq!(manifest.columns.len(), 6);
    assert_eq!(manifest.writer.records_written, 5);
    assert_eq!(manifest.root, root.to_string_lossy());
}

#[test]
fn test_cancelled_run_leaves_header_and_manifest() {
    let (temp, root, mounts) = fixture();
    let output = temp.path().join("inventory.csv");
    let config = InventoryConfig::new(&root, &output);

    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = InventoryRunner::new()
        .run_with_mounts(&config, mounts, cancel)
        .unwrap();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.writer.records_written, 0);

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("name,absolute_path"));

    let manifest = RunManifest::read(&manifest_path(&output)).unwrap();
    assert_eq!(manifest.status, RunStatus::Cancelled);
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_pruned_mount_still_completes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (temp, root, _) = fixture();
    let odd = root.join(OsStr::from_bytes(b"mnt\xff"));
    if fs::create_dir(&odd).is_err() {
        // Filesystem refuses non-UTF-8 names.
        return;
    }
    let mounts = MountTable::from_entries(
        [(root.clone(), "ext4"), (odd.clone(), "nfs")],
        &ExcludedFsTypes::standard(),
    );
    let output = temp.path().join("inventory.csv");
    let config = InventoryConfig::builder()
        .root(&root)
        .output(&output)
        .path_policy(PathPolicy::Percent)
        .build()
        .unwrap();

    let summary = InventoryRunner::new()
        .run_with_mounts(&config, mounts, CancelToken::new())
        .unwrap();
    assert!(summary.status.is_complete());

    let manifest = RunManifest::read(&manifest_path(&output)).unwrap();
    assert_eq!(manifest.status, RunStatus::Complete);
    assert!(
        manifest
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::ExcludedMount && w.path.ends_with("/mnt%FF"))
    );
}

#[test]
fn test_unwritable_output_is_fatal() {
    let (_temp, root, mounts) = fixture();
    let config = InventoryConfig::new(&root, root.join("missing-dir/inventory.csv"));

    let err = InventoryRunner::new()
        .run_with_mounts(&config, mounts, CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, InventoryError::Output { .. }));
}

#[test]
fn test_invalid_root_does_not_create_output() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("inventory.csv");
    let config = InventoryConfig::new(temp.path().join("nope"), &output);

    let err = InventoryRunner::new()
        .run_with_mounts(&config, MountTable::unavailable(), CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, InventoryError::NotFound { .. }));
    assert!(!output.exists());
}

#[test]
fn test_unavailable_mount_table_yields_empty_inventory() {
    let (temp, root, _) = fixture();
    let output = temp.path().join("inventory.csv");
    let config = InventoryConfig::new(&root, &output);

    let summary = InventoryRunner::new()
        .run_with_mounts(&config, MountTable::unavailable(), CancelToken::new())
        .unwrap();
    assert_eq!(summary.writer.records_written, 0);
    assert_eq!(summary.stats.pruned_mounts, 1);
    assert!(summary.status.is_complete());
}

#[test]
fn test_csv_sink_writes_each_batch_whole() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("out.csv");
    let sink = CsvSink::create(&path, ColumnLayout::new(true)).unwrap();
    let mut writer = StreamingWriter::new(sink, 3);

    for n in 0..4u64 {
        writer
            .append(EntryRecord::file(
                format!("f{n}"),
                format!("/r/f{n}"),
                n,
                Timestamps::default(),
            ))
            .unwrap();
    }
    // Three records flushed, one still buffered.
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);
    assert_eq!(writer.resident(), 1);

    writer.finish().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 5);
}

/// Fails the check if any batch exceeds the bound.
struct BoundedSink {
    bound: usize,
    batches: usize,
    records: usize,
}

impl RecordSink for BoundedSink {
    fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError> {
        assert!(!batch.is_empty());
        assert!(batch.len() <= self.bound);
        self.batches += 1;
        self.records += batch.len();
        Ok(())
    }
}

proptest! {
    #[test]
    fn prop_residency_never_exceeds_batch_size(batch_size in 1usize..16, count in 0usize..200) {
        let sink = BoundedSink { bound: batch_size, batches: 0, records: 0 };
        let mut writer = StreamingWriter::new(sink, batch_size);

        for n in 0..count {
            writer
                .append(EntryRecord::file("f", format!("/r/{n}"), 1, Timestamps::default()))
                .unwrap();
            prop_assert!(writer.resident() < batch_size);
        }

        let (sink, stats) = writer.finish().unwrap();
        prop_assert_eq!(sink.records, count);
        prop_assert_eq!(sink.batches, count.div_ceil(batch_size));
        prop_assert_eq!(stats.records_written as usize, count);
    }
}
